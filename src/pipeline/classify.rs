//! Classifier adapter: document bytes in, `(category, title)` out.
//!
//! [`Classifier::classify`] never fails. It returns a two-branch
//! [`Classification`]: either the oracle answered with a usable result, or
//! it did not and the deterministic fallback (`Uncategorized`, source stem)
//! was used. Callers that only need a destination call
//! [`Classification::into_result`]; tests and logs can still tell the two
//! branches apart.

use crate::config::FilerConfig;
use crate::error::OracleError;
use crate::oracle::{build_oracle, ClassificationOracle};
use crate::pipeline::reduce;
use crate::prompts::{CATEGORY_FIELD, CLASSIFY_PROMPT, TITLE_FIELD};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Category used whenever no usable one is available.
pub const FALLBACK_CATEGORY: &str = "Uncategorized";

/// A category and a free-text title for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub category: String,
    pub title: String,
}

impl ClassificationResult {
    pub fn new(category: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
        }
    }

    /// The fallback result for a source file stem.
    pub fn fallback(source_stem: &str) -> Self {
        Self::new(FALLBACK_CATEGORY, source_stem)
    }
}

/// Where a filed paper's category and title came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Given by the caller or by arXiv metadata.
    Supplied,
    /// Answered by the oracle.
    Oracle,
    /// The oracle failed; fixed fallback values were used.
    Fallback,
}

/// Outcome of one classification attempt.
#[derive(Debug, Clone)]
pub enum Classification {
    Oracle(ClassificationResult),
    Fallback {
        result: ClassificationResult,
        reason: OracleError,
    },
}

impl Classification {
    pub fn result(&self) -> &ClassificationResult {
        match self {
            Classification::Oracle(result) | Classification::Fallback { result, .. } => result,
        }
    }

    pub fn into_result(self) -> ClassificationResult {
        match self {
            Classification::Oracle(result) | Classification::Fallback { result, .. } => result,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Classification::Fallback { .. })
    }

    pub fn source(&self) -> ClassificationSource {
        match self {
            Classification::Oracle(_) => ClassificationSource::Oracle,
            Classification::Fallback { .. } => ClassificationSource::Fallback,
        }
    }
}

/// Sends a reduced document to the oracle and parses the answer.
pub struct Classifier {
    /// `Err` when the oracle could not be built; every call then falls back.
    oracle: Result<Arc<dyn ClassificationOracle>, OracleError>,
    pdfium_lib: Option<PathBuf>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field(
                "oracle",
                &self.oracle.as_ref().map(|o| o.name().to_string()),
            )
            .field("pdfium_lib", &self.pdfium_lib)
            .finish()
    }
}

impl Classifier {
    pub fn new(
        oracle: Result<Arc<dyn ClassificationOracle>, OracleError>,
        pdfium_lib: Option<PathBuf>,
    ) -> Self {
        Self { oracle, pdfium_lib }
    }

    /// Build the oracle described by `config`. A build failure is kept and
    /// reported on each classification as a fallback reason.
    pub fn from_config(config: &FilerConfig) -> Self {
        let pdfium_lib = config.pdfium_lib_path.clone();
        Self::new(build_oracle(&config.oracle, pdfium_lib.clone()), pdfium_lib)
    }

    /// Classify `document`, falling back to `(Uncategorized, source_stem)`.
    pub async fn classify(&self, document: &[u8], source_stem: &str) -> Classification {
        let oracle = match &self.oracle {
            Ok(oracle) => oracle,
            Err(e) => return fallback(source_stem, e.clone()),
        };

        let payload = match reduce::first_page_pdf(document.to_vec(), self.pdfium_lib.clone()).await
        {
            Ok(page) => page,
            Err(e) => {
                warn!("First-page reduction failed ({}), sending full document", e);
                document.to_vec()
            }
        };

        debug!(
            "Classifying via {} ({} of {} bytes)",
            oracle.name(),
            payload.len(),
            document.len()
        );

        let parsed = match oracle.complete(CLASSIFY_PROMPT, &payload).await {
            Ok(text) => parse_response(&text),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(result) => {
                info!(
                    "Classified as {} / \"{}\"",
                    result.category, result.title
                );
                Classification::Oracle(result)
            }
            Err(e) => fallback(source_stem, e),
        }
    }

    /// Read `path` and classify it, using its file stem for the fallback title.
    pub async fn classify_file(&self, path: &Path) -> std::io::Result<Classification> {
        let bytes = tokio::fs::read(path).await?;
        Ok(self.classify(&bytes, &source_stem(path)).await)
    }
}

fn fallback(source_stem: &str, reason: OracleError) -> Classification {
    warn!(
        "Classification failed, filing under {}: {}",
        FALLBACK_CATEGORY, reason
    );
    Classification::Fallback {
        result: ClassificationResult::fallback(source_stem),
        reason,
    }
}

/// File stem of `path` as an owned string (lossy for non-UTF-8 names).
pub fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse an oracle reply into a [`ClassificationResult`].
///
/// Accepts a bare JSON object or one wrapped in markdown fences or prose; the
/// text between the first `{` and the last `}` is parsed. Both fields must be
/// non-empty strings. The category is reduced to its alphanumeric characters
/// so it is always a single path component.
pub fn parse_response(text: &str) -> Result<ClassificationResult, OracleError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(OracleError::Malformed {
                detail: "no JSON object in reply".to_string(),
            })
        }
    };

    let value: Value = serde_json::from_str(json).map_err(|e| OracleError::Malformed {
        detail: format!("invalid JSON: {e}"),
    })?;

    let field = |name: &str| -> Result<String, OracleError> {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| OracleError::Malformed {
                detail: format!("missing or empty \"{name}\""),
            })
    };

    let category: String = field(CATEGORY_FIELD)?
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if category.is_empty() {
        return Err(OracleError::Malformed {
            detail: format!("\"{CATEGORY_FIELD}\" has no alphanumeric characters"),
        });
    }
    let title = field(TITLE_FIELD)?;

    Ok(ClassificationResult { category, title })
}
