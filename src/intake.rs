//! Intake dispatcher: route one input string to the right filing path.
//!
//! ```text
//! input ──▶ resolve ──Ok──▶ metadata ──title──▶ download ──▶ file(title, category)
//!              │                 └──no title──┐
//!              └──NotAnIdentifier─────────────┴──▶ file(local path) ──▶ classify
//! ```
//!
//! When arXiv has no entry for the identifier and the input is not a file
//! either, dispatch fails with [`PaperError::MetadataUnavailable`].
//!
//! An arXiv paper whose metadata has no category is filed under
//! `Uncategorized` without asking the oracle, unlike local files. Set
//! [`FilerConfig::classify_missing_category`] to classify it instead.

use crate::bridge::RemoteBridge;
use crate::config::FilerConfig;
use crate::error::PaperError;
use crate::filing::{FilingEngine, FilingHints, FilingReceipt};
use crate::pipeline::classify::FALLBACK_CATEGORY;
use crate::pipeline::filename::{shorten, DEFAULT_SHORT_WORDS};
use crate::pipeline::identifier::{resolve, ArxivClient, ArxivId};
use crate::progress::{FilingStage, NoopProgressCallback, ProgressCallback};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Exit code for a filed (or dry-run filed) paper.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for any failure.
pub const EXIT_FAILURE: u8 = 1;

/// What the user pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentInput {
    LocalPath(PathBuf),
    RemoteRef(ArxivId),
}

impl DocumentInput {
    /// Classify a raw input string. Anything that is not an arXiv
    /// identifier is taken as a local path.
    pub fn from_input(input: &str) -> Self {
        match resolve(input) {
            Ok(id) => DocumentInput::RemoteRef(id),
            Err(e) => {
                debug!("{}; treating input as a local path", e);
                DocumentInput::LocalPath(PathBuf::from(input))
            }
        }
    }
}

/// Top-level entry point: one input in, one filed paper out.
pub struct Dispatcher {
    engine: FilingEngine,
    arxiv: ArxivClient,
    classify_missing_category: bool,
    progress: ProgressCallback,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("engine", &self.engine)
            .field("arxiv", &self.arxiv)
            .field("classify_missing_category", &self.classify_missing_category)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(engine: FilingEngine, arxiv: ArxivClient) -> Self {
        Self {
            engine,
            arxiv,
            classify_missing_category: false,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Dispatcher wired from `config`, filing through `bridge`.
    pub fn from_config(
        bridge: Arc<dyn RemoteBridge>,
        config: &FilerConfig,
    ) -> Result<Self, PaperError> {
        let dispatcher = Self::new(
            FilingEngine::from_config(bridge, config),
            ArxivClient::from_config(config)?,
        )
        .with_classify_missing_category(config.classify_missing_category);

        Ok(match config.progress_callback {
            Some(ref cb) => dispatcher.with_progress(Arc::clone(cb)),
            None => dispatcher,
        })
    }

    pub fn with_classify_missing_category(mut self, enabled: bool) -> Self {
        self.classify_missing_category = enabled;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn engine(&self) -> &FilingEngine {
        &self.engine
    }

    /// File `input` and report the outcome to the progress callback.
    pub async fn dispatch(&self, input: &str, dry_run: bool) -> Result<FilingReceipt, PaperError> {
        let result = self.route(input, dry_run).await;
        match result {
            Ok(ref receipt) => self.progress.on_complete(&receipt.remote_path, receipt.dry_run),
            Err(ref e) => self.progress.on_failed(&e.to_string()),
        }
        result
    }

    /// File `input` and map the outcome to a process exit code.
    ///
    /// Returns [`EXIT_SUCCESS`] or [`EXIT_FAILURE`]; every failure is logged.
    pub async fn run(&self, input: &str, dry_run: bool) -> u8 {
        match self.dispatch(input, dry_run).await {
            Ok(_) => EXIT_SUCCESS,
            Err(e) => {
                error!("{}", e);
                EXIT_FAILURE
            }
        }
    }

    async fn route(&self, input: &str, dry_run: bool) -> Result<FilingReceipt, PaperError> {
        self.progress.on_stage(FilingStage::Resolving);
        match DocumentInput::from_input(input) {
            DocumentInput::RemoteRef(id) => self.file_remote(input, &id, dry_run).await,
            DocumentInput::LocalPath(path) => self.file_local(&path, dry_run).await,
        }
    }

    async fn file_local(&self, path: &Path, dry_run: bool) -> Result<FilingReceipt, PaperError> {
        info!("Filing local file {}", path.display());
        self.engine.file(path, FilingHints::default(), dry_run).await
    }

    async fn file_remote(
        &self,
        input: &str,
        id: &ArxivId,
        dry_run: bool,
    ) -> Result<FilingReceipt, PaperError> {
        info!("Detected arXiv paper: {}", id);

        self.progress.on_stage(FilingStage::FetchingMetadata);
        let metadata = self.arxiv.fetch_metadata(id).await;
        let Some(title) = metadata.title else {
            let fallback = Path::new(input);
            if !fallback.is_file() {
                return Err(PaperError::MetadataUnavailable { id: id.to_string() });
            }
            info!("No arXiv metadata for {}; filing '{}' as a local file", id, input);
            return self.file_local(fallback, dry_run).await;
        };

        self.progress.on_stage(FilingStage::Downloading);
        // Keeps a scratch download alive until filing returns.
        let download = self.arxiv.fetch_bytes(id, None).await?;

        let category = match metadata.category {
            Some(category) => Some(category),
            None if self.classify_missing_category => {
                info!("arXiv lists no category for {}; asking the classifier", id);
                None
            }
            None => {
                info!("arXiv lists no category for {}; using {}", id, FALLBACK_CATEGORY);
                Some(FALLBACK_CATEGORY.to_string())
            }
        };

        info!(
            "Paper: {} [{}]",
            shorten(&title, DEFAULT_SHORT_WORDS),
            category.as_deref().unwrap_or("?")
        );

        let hints = FilingHints {
            title: Some(title),
            category,
            filename: None,
        };
        self.engine.file(download.path(), hints, dry_run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_forms_are_remote() {
        for input in ["2301.12345", "arXiv:2301.12345", "https://arxiv.org/pdf/2301.12345.pdf"] {
            assert!(
                matches!(DocumentInput::from_input(input), DocumentInput::RemoteRef(ref id) if id.as_str() == "2301.12345"),
                "{input}"
            );
        }
    }

    #[test]
    fn everything_else_is_local() {
        assert_eq!(
            DocumentInput::from_input("not-an-id-or-path"),
            DocumentInput::LocalPath(PathBuf::from("not-an-id-or-path"))
        );
        assert_eq!(
            DocumentInput::from_input("./papers/draft.pdf"),
            DocumentInput::LocalPath(PathBuf::from("./papers/draft.pdf"))
        );
    }
}
