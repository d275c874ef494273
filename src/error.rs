//! Error types for the papershelf library.
//!
//! Failures fall into three groups, and each group has its own type:
//!
//! * [`PaperError`] — **Fatal**: the paper cannot be filed (source missing,
//!   download failed, remote directory or upload rejected). Returned as
//!   `Err(PaperError)` from the filing engine and the intake dispatcher; the
//!   CLI turns it into exit code 1.
//!
//! * [`BridgeError`] — one failed invocation of the remote filesystem bridge,
//!   tagged with a [`BridgeErrorKind`] so callers and tests can tell a dead
//!   network from an expired session. It always travels inside a
//!   [`PaperError`] variant naming the step that failed.
//!
//! * [`ResolveError`], [`OracleError`], [`ReduceError`] — **Recoverable**:
//!   they steer routing or trigger a fallback and never reach the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the papershelf library.
#[derive(Debug, Error)]
pub enum PaperError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The local paper does not exist (or is not a regular file).
    #[error("Paper file not found: '{path}'\nCheck the path, or pass an arXiv ID/URL instead.")]
    SourceNotFound { path: PathBuf },

    /// The local paper exists but could not be read.
    #[error("Failed to read paper '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── arXiv errors ──────────────────────────────────────────────────────
    /// The arXiv API returned no usable entry for this identifier.
    #[error("No arXiv metadata available for '{id}'")]
    MetadataUnavailable { id: String },

    /// The paper PDF could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    FetchFailed { url: String, reason: String },

    /// The paper download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    FetchTimeout { url: String, secs: u64 },

    // ── Remote store errors ───────────────────────────────────────────────
    /// `/papers/<category>` could not be verified or created. Nothing was uploaded.
    #[error("Could not ensure remote directory '{path}': {source}")]
    DirectoryEnsure {
        path: String,
        #[source]
        source: BridgeError,
    },

    /// The bridge rejected the upload.
    #[error("Upload of '{local}' into '{remote_dir}' failed: {source}")]
    UploadFailed {
        local: PathBuf,
        remote_dir: String,
        #[source]
        source: BridgeError,
    },

    /// The upload went through but the rename did not.
    ///
    /// The document stays on the device under `uploaded`; no rollback is tried.
    #[error("Uploaded as '{uploaded}' but renaming to '{target}' failed: {source}")]
    RenameFailed {
        uploaded: String,
        target: String,
        #[source]
        source: BridgeError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaperError {
    /// The bridge failure behind this error, if the remote store caused it.
    pub fn bridge_error(&self) -> Option<&BridgeError> {
        match self {
            PaperError::DirectoryEnsure { source, .. }
            | PaperError::UploadFailed { source, .. }
            | PaperError::RenameFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Bridge errors ────────────────────────────────────────────────────────

/// The bridge sub-command that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BridgeOp {
    List,
    MakeDir,
    Put,
    Move,
}

impl BridgeOp {
    /// The rmapi sub-command name.
    pub fn command(self) -> &'static str {
        match self {
            BridgeOp::List => "ls",
            BridgeOp::MakeDir => "mkdir",
            BridgeOp::Put => "put",
            BridgeOp::Move => "mv",
        }
    }
}

impl fmt::Display for BridgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Why a bridge invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BridgeErrorKind {
    /// The bridge could not be started or could not reach the cloud.
    Transport,
    /// The bridge session is missing or expired.
    Auth,
    /// The remote store refused the operation.
    RemoteRejected,
    /// The remote path does not exist.
    NotFound,
}

impl BridgeErrorKind {
    /// Infer the failure kind from the bridge's captured error stream.
    ///
    /// rmapi reports everything as free text, so this is a keyword match.
    /// Anything unrecognised counts as [`BridgeErrorKind::RemoteRejected`].
    pub fn from_stderr(stderr: &str) -> Self {
        let s = stderr.to_lowercase();
        if RE_TRANSPORT.is_match(&s) {
            BridgeErrorKind::Transport
        } else if RE_AUTH.is_match(&s) {
            BridgeErrorKind::Auth
        } else if RE_NOT_FOUND.is_match(&s) {
            BridgeErrorKind::NotFound
        } else {
            BridgeErrorKind::RemoteRejected
        }
    }
}

// Matched against lower-cased stderr, whole words only.
static RE_TRANSPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(dial tcp|no such host|connection (refused|reset)|timeout|timed out|network is unreachable|tls handshake)\b",
    )
    .unwrap()
});

static RE_AUTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(unauthori[sz]ed|not authori[sz]ed|forbidden|401|403|authenticat(e|ed|ion)|login|(invalid|expired|missing|bad) (device |user )?token|token (is )?(invalid|expired|missing)|refresh token)\b",
    )
    .unwrap()
});

static RE_NOT_FOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(not found|no such (file|entry)|does not exist|doesn't exist)\b").unwrap()
});

impl fmt::Display for BridgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BridgeErrorKind::Transport => "transport",
            BridgeErrorKind::Auth => "authentication",
            BridgeErrorKind::RemoteRejected => "rejected by remote",
            BridgeErrorKind::NotFound => "not found",
        })
    }
}

/// One failed bridge invocation.
#[derive(Debug, Clone, Error)]
#[error("rmapi {op} '{path}' failed ({kind}): {detail}")]
pub struct BridgeError {
    pub kind: BridgeErrorKind,
    pub op: BridgeOp,
    pub path: String,
    pub detail: String,
}

impl BridgeError {
    pub fn new(
        kind: BridgeErrorKind,
        op: BridgeOp,
        path: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            op,
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Build an error from a non-zero exit, classifying the error stream.
    pub fn from_exit(op: BridgeOp, path: &str, code: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let detail = match (code, stderr.is_empty()) {
            (Some(c), true) => format!("exit status {c}"),
            (Some(c), false) => format!("exit status {c}: {stderr}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {stderr}"),
        };
        Self::new(BridgeErrorKind::from_stderr(stderr), op, path, detail)
    }
}

// ── Recoverable errors ───────────────────────────────────────────────────

/// The input is not an arXiv identifier. The dispatcher treats it as a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Unable to parse an arXiv ID from '{input}'")]
    NotAnIdentifier { input: String },
}

/// A classification oracle call failed.
///
/// Never escapes the classifier: every variant turns into the
/// `Uncategorized` fallback.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// No API key (or no provider) was configured.
    #[error("Oracle '{provider}' is not configured: {hint}")]
    MissingCredentials { provider: String, hint: String },

    /// The request never got a response.
    #[error("Oracle request failed: {0}")]
    Transport(String),

    /// The API answered with an error.
    #[error("Oracle API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered without any text.
    #[error("Oracle returned an empty response")]
    EmptyResponse,

    /// The text did not contain the two expected fields.
    #[error("Malformed oracle response: {detail}")]
    Malformed { detail: String },
}

/// Shrinking the payload to its first page failed; the full document is sent.
#[derive(Debug, Clone, Error)]
pub enum ReduceError {
    #[error("PDFium is not available: {0}")]
    PdfiumUnavailable(String),

    #[error("PDF could not be parsed: {0}")]
    Unreadable(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("First-page extraction failed: {0}")]
    Extraction(String),
}
