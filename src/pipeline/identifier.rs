//! arXiv identifier resolution, metadata lookup and PDF download.
//!
//! [`resolve`] is pure: it decides whether a user string names an arXiv
//! paper. [`ArxivClient`] does the network work once it does.
//!
//! Metadata is best-effort — any transport or parse failure yields an empty
//! [`PaperMetadata`] and the dispatcher reroutes. The PDF download is not:
//! without the bytes there is nothing to file, so it fails loudly.

use crate::config::FilerConfig;
use crate::error::{PaperError, ResolveError};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// A canonical arXiv identifier such as `2301.12345` or `2301.12345v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArxivId(String);

impl ArxivId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form used for the default download name.
    pub fn file_stem(&self) -> String {
        format!("arxiv_{}", self.0.replace('/', "_"))
    }
}

impl fmt::Display for ArxivId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier patterns, tried in order against the lower-cased input.
///
/// 1. abstract or PDF URL, with or without scheme and `www.`
/// 2. `arxiv:` prefix (optional) — matches anywhere in the input
/// 3. the bare identifier on its own
static ID_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(
            r"(?:https?://)?(?:www\.)?arxiv\.org/(?:abs|pdf)/([0-9]{4}\.[0-9]{4,5}(?:v\d+)?)",
        )
        .unwrap(),
        Regex::new(r"(?:arxiv:)?([0-9]{4}\.[0-9]{4,5}(?:v\d+)?)").unwrap(),
        Regex::new(r"^([0-9]{4}\.[0-9]{4,5}(?:v\d+)?)$").unwrap(),
    ]
});

/// Parse an arXiv identifier out of a bare ID, an `arxiv:` reference or an
/// arXiv abstract/PDF URL.
///
/// ```
/// use papershelf::pipeline::identifier::resolve;
/// assert_eq!(resolve("https://arxiv.org/abs/2301.12345v2").unwrap().as_str(), "2301.12345v2");
/// assert!(resolve("notes/draft.pdf").is_err());
/// ```
pub fn resolve(input: &str) -> Result<ArxivId, ResolveError> {
    let lowered = input.trim().to_lowercase();
    ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(&lowered))
        .map(|caps| ArxivId(caps[1].to_string()))
        .ok_or_else(|| ResolveError::NotAnIdentifier {
            input: input.to_string(),
        })
}

/// Title and mapped category for one paper. Both absent when lookup failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperMetadata {
    pub title: Option<String>,
    pub category: Option<String>,
}

/// Top-level arXiv archives and their folder names on the device.
///
/// Existing folders were created with these names; keep them stable.
const CATEGORY_MAP: &[(&str, &str)] = &[
    ("cs", "ComputerScience"),
    ("math", "Mathematics"),
    ("physics", "Physics"),
    ("q-bio", "QuantumBiology"),
    ("q-fin", "QuantumFinance"),
    ("stat", "Statistics"),
    ("eess", "Engineering"),
    ("econ", "Economics"),
    ("astro-ph", "Astrophysics"),
    ("cond-mat", "CondensedMatter"),
    ("gr-qc", "GeneralRelativity"),
    ("hep-ex", "HighEnergyPhysics"),
    ("hep-lat", "HighEnergyPhysics"),
    ("hep-ph", "HighEnergyPhysics"),
    ("hep-th", "HighEnergyPhysics"),
    ("math-ph", "MathematicalPhysics"),
    ("nlin", "NonlinearSciences"),
    ("nucl-ex", "NuclearPhysics"),
    ("nucl-th", "NuclearPhysics"),
    ("quant-ph", "QuantumPhysics"),
];

/// Map a primary-category term (`cs.LG`, `hep-th`, …) to a folder name.
///
/// Unknown archives pass through with hyphens removed.
pub fn map_category(term: &str) -> String {
    let archive = term.split('.').next().unwrap_or_default();
    CATEGORY_MAP
        .iter()
        .find(|(prefix, _)| *prefix == archive)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| archive.replace('-', ""))
}

/// Pull title and primary category out of an arXiv Atom feed.
///
/// Only the first `<entry>` is read. arXiv reports bad IDs as an entry whose
/// `<id>` points at `api/errors`; that counts as no entry.
pub fn parse_atom_feed(xml: &str) -> Result<PaperMetadata, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_entry = false;
    let mut field: Option<&'static str> = None;
    let mut id = String::new();
    let mut title = String::new();
    let mut category: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => in_entry = true,
                b"title" if in_entry => field = Some("title"),
                b"id" if in_entry => field = Some("id"),
                b"primary_category" if in_entry => category = term_attribute(&e)?,
                _ => {}
            },
            Event::Empty(e) => {
                if in_entry && e.local_name().as_ref() == b"primary_category" {
                    category = term_attribute(&e)?;
                }
            }
            Event::Text(t) => match field {
                Some("title") => title.push_str(&t.unescape()?),
                Some("id") => id.push_str(&t.unescape()?),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"entry" => break,
                b"title" | b"id" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !in_entry || id.contains("api/errors") {
        return Ok(PaperMetadata::default());
    }

    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(PaperMetadata {
        title: (!title.is_empty()).then_some(title),
        category: category
            .filter(|t| !t.is_empty())
            .map(|t| map_category(&t)),
    })
}

fn term_attribute(e: &quick_xml::events::BytesStart<'_>) -> Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute("term")? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// A paper on local disk, ready to be filed.
///
/// Without a configured download directory the file lives in a scratch
/// `TempDir` that is removed when this value is dropped.
#[derive(Debug)]
pub struct DownloadedPaper {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl DownloadedPaper {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file is removed on drop.
    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }
}

/// HTTP client for the arXiv API and PDF endpoint.
#[derive(Debug)]
pub struct ArxivClient {
    http: reqwest::Client,
    metadata_base_url: String,
    document_base_url: String,
    download_dir: Option<PathBuf>,
    timeout_secs: u64,
}

impl ArxivClient {
    pub fn new(
        metadata_base_url: impl Into<String>,
        document_base_url: impl Into<String>,
        download_dir: Option<PathBuf>,
        timeout_secs: u64,
    ) -> Result<Self, PaperError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("papershelf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PaperError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            metadata_base_url: metadata_base_url.into().trim_end_matches('/').to_string(),
            document_base_url: document_base_url.into().trim_end_matches('/').to_string(),
            download_dir,
            timeout_secs,
        })
    }

    pub fn from_config(config: &FilerConfig) -> Result<Self, PaperError> {
        Self::new(
            config.metadata_base_url.clone(),
            config.document_base_url.clone(),
            config.download_dir.clone(),
            config.download_timeout_secs,
        )
    }

    /// URL of the Atom query for `id`.
    pub fn metadata_url(&self, id: &ArxivId) -> String {
        format!("{}?id_list={}", self.metadata_base_url, id)
    }

    /// URL of the PDF for `id`.
    pub fn document_url(&self, id: &ArxivId) -> String {
        format!("{}/{}.pdf", self.document_base_url, id)
    }

    /// File name a downloaded paper is written under.
    pub fn download_name(&self, id: &ArxivId) -> String {
        format!("{}.pdf", id.file_stem())
    }

    /// Path under the configured download directory, if there is one.
    pub fn default_destination(&self, id: &ArxivId) -> Option<PathBuf> {
        self.download_dir
            .as_ref()
            .map(|dir| dir.join(self.download_name(id)))
    }

    /// Fetch title and mapped primary category. Never fails: on any error
    /// both fields come back `None`.
    pub async fn fetch_metadata(&self, id: &ArxivId) -> PaperMetadata {
        match self.try_fetch_metadata(id).await {
            Ok(meta) => {
                if meta.title.is_none() {
                    warn!("arXiv returned no entry for {}", id);
                }
                meta
            }
            Err(reason) => {
                warn!("Error fetching arXiv metadata for {}: {}", id, reason);
                PaperMetadata::default()
            }
        }
    }

    async fn try_fetch_metadata(&self, id: &ArxivId) -> Result<PaperMetadata, String> {
        let url = self.metadata_url(id);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        parse_atom_feed(&body).map_err(|e| format!("invalid Atom feed: {e}"))
    }

    /// Download the PDF for `id` to `destination`, the download directory,
    /// or a scratch directory removed when the returned value is dropped.
    pub async fn fetch_bytes(
        &self,
        id: &ArxivId,
        destination: Option<&Path>,
    ) -> Result<DownloadedPaper, PaperError> {
        let url = self.document_url(id);
        let (dest, temp_dir) = match destination
            .map(Path::to_path_buf)
            .or_else(|| self.default_destination(id))
        {
            Some(dest) => (dest, None),
            None => {
                let temp_dir = TempDir::new()
                    .map_err(|e| PaperError::Internal(format!("scratch dir: {e}")))?;
                (temp_dir.path().join(self.download_name(id)), Some(temp_dir))
            }
        };
        info!("Downloading paper from arXiv: {}", id);

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                PaperError::FetchTimeout {
                    url: url.clone(),
                    secs: self.timeout_secs,
                }
            } else {
                PaperError::FetchFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(PaperError::FetchFailed {
                url,
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| PaperError::FetchFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
            return Err(PaperError::FetchFailed {
                url,
                reason: "response is not a PDF".to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PaperError::Internal(format!("create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| PaperError::Internal(format!("write {}: {e}", dest.display())))?;

        info!("Downloaded {} bytes to {}", bytes.len(), dest.display());
        Ok(DownloadedPaper {
            path: dest,
            scratch: temp_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTENTION_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=&amp;id_list=1706.03762</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <title>Attention Is All
      You Need</title>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn resolve_all_forms_agree() {
        let forms = [
            "2301.12345",
            "arXiv:2301.12345",
            "ARXIV:2301.12345",
            "https://arxiv.org/abs/2301.12345",
            "http://www.arxiv.org/pdf/2301.12345",
            "arxiv.org/pdf/2301.12345.pdf",
            "  2301.12345  ",
        ];
        for f in forms {
            assert_eq!(resolve(f).unwrap().as_str(), "2301.12345", "input {f:?}");
        }
    }

    #[test]
    fn resolve_keeps_version_suffix() {
        assert_eq!(resolve("2301.12345v3").unwrap().as_str(), "2301.12345v3");
        assert_eq!(
            resolve("https://arxiv.org/abs/2301.12345v3").unwrap().as_str(),
            "2301.12345v3"
        );
        assert_eq!(resolve("arxiv:2301.1234V2").unwrap().as_str(), "2301.1234v2");
    }

    #[test]
    fn resolve_rejects_non_identifiers() {
        for input in ["not-an-id-or-path", "paper.pdf", "", "230.12345", "2301-12345"] {
            assert_eq!(
                resolve(input),
                Err(ResolveError::NotAnIdentifier {
                    input: input.to_string()
                })
            );
        }
    }

    #[test]
    fn category_map_known_and_unknown() {
        assert_eq!(map_category("cs"), "ComputerScience");
        assert_eq!(map_category("cs.LG"), "ComputerScience");
        assert_eq!(map_category("hep-th"), "HighEnergyPhysics");
        assert_eq!(map_category("quant-ph"), "QuantumPhysics");
        assert_eq!(map_category("q-bio.NC"), "QuantumBiology");
        assert_eq!(map_category("chao-dyn"), "chaodyn");
        assert_eq!(map_category("astro-ph.GA"), "Astrophysics");
    }

    #[test]
    fn atom_feed_entry() {
        let meta = parse_atom_feed(ATTENTION_FEED).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(meta.category.as_deref(), Some("ComputerScience"));
    }

    #[test]
    fn atom_feed_without_entry() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;
        assert_eq!(parse_atom_feed(xml).unwrap(), PaperMetadata::default());
    }

    #[test]
    fn atom_feed_error_entry() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format_for_9999.99999</id>
            <title>Error</title></entry></feed>"#;
        assert_eq!(parse_atom_feed(xml).unwrap(), PaperMetadata::default());
    }

    #[test]
    fn atom_feed_entry_without_category() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/abs/2301.12345v1</id>
            <title>Dark Matter Survey</title></entry></feed>"#;
        let meta = parse_atom_feed(xml).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Dark Matter Survey"));
        assert_eq!(meta.category, None);
    }

    #[test]
    fn client_urls_and_destination() {
        let client = ArxivClient::new(
            "http://export.arxiv.org/api/query",
            "https://arxiv.org/pdf/",
            Some(PathBuf::from("/tmp/papers")),
            5,
        )
        .unwrap();
        let id = resolve("2301.12345").unwrap();
        assert_eq!(
            client.metadata_url(&id),
            "http://export.arxiv.org/api/query?id_list=2301.12345"
        );
        assert_eq!(client.document_url(&id), "https://arxiv.org/pdf/2301.12345.pdf");
        assert_eq!(
            client.default_destination(&id),
            Some(PathBuf::from("/tmp/papers/arxiv_2301.12345.pdf"))
        );
    }

    #[test]
    fn no_download_dir_means_scratch_destination() {
        let client = ArxivClient::new("http://x/api/query", "http://x/pdf", None, 5).unwrap();
        let id = resolve("arXiv:2301.12345v2").unwrap();
        assert_eq!(client.default_destination(&id), None);
        assert_eq!(client.download_name(&id), "arxiv_2301.12345v2.pdf");
    }

    #[tokio::test]
    async fn metadata_failure_yields_empty() {
        // Port 9 (discard) on localhost is not an HTTP server.
        let client = ArxivClient::new("http://127.0.0.1:9/api/query", "http://127.0.0.1:9/pdf", None, 2)
            .unwrap();
        let id = resolve("2301.12345").unwrap();
        assert_eq!(client.fetch_metadata(&id).await, PaperMetadata::default());
    }
}
