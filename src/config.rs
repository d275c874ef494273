//! Configuration types for classifying and filing papers.
//!
//! Everything the pipeline needs from the outside world — where the bridge
//! binary lives, which session file it uses, how to reach the oracle and the
//! arXiv API — is carried in one [`FilerConfig`] value, built via
//! [`FilerConfigBuilder`]. Nothing is read from or written to process-wide
//! environment variables after construction, so two engines with different
//! configs can run side by side in one test binary.

use crate::error::PaperError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default remote folder that holds one sub-folder per category.
pub const DEFAULT_REMOTE_ROOT: &str = "/papers";

/// Default arXiv Atom API endpoint.
pub const DEFAULT_METADATA_BASE_URL: &str = "http://export.arxiv.org/api/query";

/// Default arXiv PDF endpoint.
pub const DEFAULT_DOCUMENT_BASE_URL: &str = "https://arxiv.org/pdf";

/// Default Anthropic model used by the document oracle.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Default model when a vision provider is named without a model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// How to invoke the remote filesystem bridge (rmapi).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Path to the rmapi executable. Default: `./bin/rmapi`.
    pub binary: PathBuf,

    /// Session/config file handed to rmapi through `RMAPI_CONFIG`.
    ///
    /// Set on the child process only.
    pub config_path: Option<PathBuf>,

    /// Kill a bridge invocation that runs longer than this. Default: none.
    pub timeout_secs: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./bin/rmapi"),
            config_path: Some(PathBuf::from("./.rmapi")),
            timeout_secs: None,
        }
    }
}

/// Which classification oracle to call and how.
#[derive(Clone)]
pub struct OracleConfig {
    /// Anthropic API key. Without it the document oracle always falls back.
    pub api_key: Option<String>,

    /// Model identifier. If None, uses the oracle's default.
    pub model: Option<String>,

    /// Maximum tokens in the oracle's reply. Default: 100.
    ///
    /// The reply is a two-field JSON object; 100 tokens leaves headroom for
    /// a long title without paying for chatter.
    pub max_tokens: usize,

    /// Anthropic API base URL. Default: `https://api.anthropic.com`.
    pub api_base_url: String,

    /// Per-request timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Vision provider name (e.g. "openai", "gemini", "ollama").
    ///
    /// When set, classification goes through an `edgequake-llm` provider with
    /// the rasterised first page instead of the Anthropic document API.
    pub provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Longest edge, in pixels, of the page image sent to a vision provider. Default: 1600.
    pub max_rendered_pixels: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            max_tokens: 100,
            api_base_url: "https://api.anthropic.com".to_string(),
            api_timeout_secs: 60,
            provider_name: None,
            provider: None,
            max_rendered_pixels: 1600,
        }
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_base_url", &self.api_base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .finish()
    }
}

/// Configuration for one filing engine / dispatcher.
///
/// Built via [`FilerConfig::builder()`] or using [`FilerConfig::default()`].
///
/// # Example
/// ```rust
/// use papershelf::FilerConfig;
///
/// let config = FilerConfig::builder()
///     .bridge_binary("/usr/local/bin/rmapi")
///     .remote_root("/papers")
///     .download_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FilerConfig {
    /// Bridge invocation settings.
    pub bridge: BridgeConfig,

    /// Remote folder holding the category folders. Default: `/papers`.
    pub remote_root: String,

    /// Classification oracle settings.
    pub oracle: OracleConfig,

    /// Explicit libpdfium location. If None, the system library is used.
    ///
    /// Only needed for first-page reduction and vision rasterisation; without
    /// pdfium the full document is sent to the oracle instead.
    pub pdfium_lib_path: Option<PathBuf>,

    /// arXiv Atom API endpoint.
    pub metadata_base_url: String,

    /// arXiv PDF endpoint; `<base>/<id>.pdf` is downloaded.
    pub document_base_url: String,

    /// Where downloaded papers are kept. If None, each download goes to a
    /// scratch directory that is removed once the paper is filed.
    pub download_dir: Option<PathBuf>,

    /// Timeout for arXiv metadata and PDF requests, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Ask the oracle for a category when arXiv metadata has none. Default: false.
    ///
    /// Off by default: an arXiv paper without a subject is filed under
    /// `Uncategorized` without spending an oracle call.
    pub classify_missing_category: bool,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FilerConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            oracle: OracleConfig::default(),
            pdfium_lib_path: None,
            metadata_base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            document_base_url: DEFAULT_DOCUMENT_BASE_URL.to_string(),
            download_dir: None,
            download_timeout_secs: 120,
            classify_missing_category: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FilerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilerConfig")
            .field("bridge", &self.bridge)
            .field("remote_root", &self.remote_root)
            .field("oracle", &self.oracle)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("metadata_base_url", &self.metadata_base_url)
            .field("document_base_url", &self.document_base_url)
            .field("download_dir", &self.download_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("classify_missing_category", &self.classify_missing_category)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn FilingProgressCallback>"),
            )
            .finish()
    }
}

impl FilerConfig {
    /// Create a new builder for `FilerConfig`.
    pub fn builder() -> FilerConfigBuilder {
        FilerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FilerConfig`].
#[derive(Debug)]
pub struct FilerConfigBuilder {
    config: FilerConfig,
}

impl FilerConfigBuilder {
    pub fn bridge_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.bridge.binary = path.into();
        self
    }

    pub fn bridge_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.bridge.config_path = Some(path.into());
        self
    }

    pub fn bridge_timeout_secs(mut self, secs: u64) -> Self {
        self.config.bridge.timeout_secs = Some(secs.max(1));
        self
    }

    pub fn remote_root(mut self, root: impl Into<String>) -> Self {
        self.config.remote_root = root.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.oracle.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.oracle.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.oracle.max_tokens = n;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.oracle.api_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.oracle.api_timeout_secs = secs;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.oracle.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.oracle.provider = Some(provider);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.oracle.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn metadata_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.metadata_base_url = url.into();
        self
    }

    pub fn document_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.document_base_url = url.into();
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn classify_missing_category(mut self, v: bool) -> Self {
        self.config.classify_missing_category = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FilerConfig, PaperError> {
        let c = &self.config;
        if !c.remote_root.starts_with('/') {
            return Err(PaperError::InvalidConfig(format!(
                "Remote root must be an absolute path, got '{}'",
                c.remote_root
            )));
        }
        if c.remote_root.trim_matches('/').is_empty() {
            return Err(PaperError::InvalidConfig(
                "Remote root must name a folder, not '/'".into(),
            ));
        }
        if c.bridge.binary.as_os_str().is_empty() {
            return Err(PaperError::InvalidConfig("Bridge binary path is empty".into()));
        }
        if c.oracle.max_tokens == 0 {
            return Err(PaperError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.download_timeout_secs == 0 || c.oracle.api_timeout_secs == 0 {
            return Err(PaperError::InvalidConfig("Timeouts must be ≥ 1 second".into()));
        }
        Ok(self.config)
    }
}
