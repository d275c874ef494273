//! The remote filesystem bridge: list, mkdir, put and mv on the device.
//!
//! [`RemoteBridge`] is the seam; [`RmapiBridge`] implements it by spawning
//! the `rmapi` CLI once per operation. Tests and dry runs against a fake
//! store implement the trait directly.
//!
//! Listings are parsed into a [`Listing`] of discrete names. Existence checks
//! go through [`Listing::contains_dir`], an exact match. The old raw-text
//! substring test is still available as [`Listing::raw_contains`] for callers
//! that need to reproduce it, but nothing in the engine uses it.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeErrorKind, BridgeOp};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

// ── Listings ─────────────────────────────────────────────────────────────

/// Kind of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Document,
}

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Parsed snapshot of one remote directory's immediate children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: Vec<ListingEntry>,
    raw: String,
}

impl Listing {
    /// Parse `rmapi ls` output: one `[d]\tname` or `[f]\tname` per line.
    ///
    /// Lines without a recognised marker are ignored.
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .lines()
            .filter_map(|line| {
                let line = line.trim_end_matches('\r');
                let (kind, rest) = if let Some(rest) = line.strip_prefix("[d]") {
                    (EntryKind::Directory, rest)
                } else if let Some(rest) = line.strip_prefix("[f]") {
                    (EntryKind::Document, rest)
                } else {
                    return None;
                };
                let name = rest.strip_prefix('\t').unwrap_or_else(|| rest.trim_start());
                if name.is_empty() {
                    return None;
                }
                Some(ListingEntry {
                    name: name.to_string(),
                    kind,
                })
            })
            .collect();

        Self {
            entries,
            raw: raw.to_string(),
        }
    }

    /// Build a listing from entries, rendering the equivalent raw text.
    pub fn from_entries(entries: Vec<ListingEntry>) -> Self {
        let raw = entries
            .iter()
            .map(|e| {
                let marker = match e.kind {
                    EntryKind::Directory => "[d]",
                    EntryKind::Document => "[f]",
                };
                format!("{marker}\t{}\n", e.name)
            })
            .collect();
        Self { entries, raw }
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    /// Whether a directory named exactly `name` is listed.
    pub fn contains_dir(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == EntryKind::Directory && e.name == name)
    }

    /// Whether any entry, of either kind, is named exactly `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Substring test against the unparsed output.
    ///
    /// Gives false positives when `name` is part of another entry's name
    /// (`ML` inside `HTML`). Kept for compatibility; prefer [`contains_dir`].
    ///
    /// [`contains_dir`]: Listing::contains_dir
    pub fn raw_contains(&self, name: &str) -> bool {
        self.raw.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Bridge trait ─────────────────────────────────────────────────────────

/// Operations on the remote document store. Paths are POSIX-style and
/// rooted at `/`.
#[async_trait]
pub trait RemoteBridge: Send + Sync {
    /// List the immediate children of `path`.
    async fn list(&self, path: &str) -> Result<Listing, BridgeError>;

    /// Create the directory `path`. Its parent must exist.
    async fn make_dir(&self, path: &str) -> Result<(), BridgeError>;

    /// Upload `local` into the directory `remote_dir`. The document keeps
    /// the local file stem as its name.
    async fn put(&self, local: &Path, remote_dir: &str) -> Result<(), BridgeError>;

    /// Move or rename the entry at `src` to `dst`.
    async fn rename(&self, src: &str, dst: &str) -> Result<(), BridgeError>;
}

// ── rmapi ────────────────────────────────────────────────────────────────

/// [`RemoteBridge`] backed by the `rmapi` command-line tool.
///
/// The session file is passed to each child as `RMAPI_CONFIG`; this process's
/// environment is left alone.
#[derive(Debug, Clone)]
pub struct RmapiBridge {
    binary: PathBuf,
    config_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl RmapiBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            binary: config.binary,
            config_path: config.config_path,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run one rmapi sub-command and return its stdout.
    async fn run(&self, op: BridgeOp, path: &str, args: &[&OsStr]) -> Result<String, BridgeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(op.command())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref config) = self.config_path {
            cmd.env("RMAPI_CONFIG", config);
        }

        debug!(
            "$ {} {} {}",
            self.binary.display(),
            op.command(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(BridgeError::new(
                        BridgeErrorKind::Transport,
                        op,
                        path,
                        format!("no response after {}s", limit.as_secs()),
                    ))
                }
            },
            None => cmd.output().await,
        }
        .map_err(|e| {
            BridgeError::new(
                BridgeErrorKind::Transport,
                op,
                path,
                format!("cannot run '{}': {}", self.binary.display(), e),
            )
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BridgeError::from_exit(op, path, output.status.code(), &stderr));
        }
        if !stderr.trim().is_empty() {
            debug!("rmapi {}: {}", op.command(), stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RemoteBridge for RmapiBridge {
    async fn list(&self, path: &str) -> Result<Listing, BridgeError> {
        let out = self.run(BridgeOp::List, path, &[OsStr::new(path)]).await?;
        Ok(Listing::parse(&out))
    }

    async fn make_dir(&self, path: &str) -> Result<(), BridgeError> {
        self.run(BridgeOp::MakeDir, path, &[OsStr::new(path)])
            .await
            .map(drop)
    }

    async fn put(&self, local: &Path, remote_dir: &str) -> Result<(), BridgeError> {
        let dest = format!("{}/", remote_dir.trim_end_matches('/'));
        self.run(BridgeOp::Put, remote_dir, &[local.as_os_str(), OsStr::new(&dest)])
            .await
            .map(drop)
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), BridgeError> {
        self.run(BridgeOp::Move, src, &[OsStr::new(src), OsStr::new(dst)])
            .await
            .map(drop)
    }
}
