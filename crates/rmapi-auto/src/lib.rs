//! # rmapi-auto
//!
//! Find or fetch the [rmapi](https://github.com/ddvk/rmapi) binary at
//! runtime, so that filing a paper needs no manual install step.
//!
//! ## How it works
//!
//! On a call to [`ensure_rmapi`]:
//!
//! 1. `RMAPI_BIN` wins if it points at an existing file.
//! 2. A previously installed `./bin/rmapi` is reused.
//! 3. `~/.cache/papershelf/rmapi/rmapi` is reused.
//! 4. Otherwise the platform `.tar.gz` is downloaded from the latest
//!    ddvk/rmapi release, the `rmapi` entry is extracted into the cache
//!    directory and marked executable.
//!
//! Only the first run touches the network.
//!
//! ## Usage
//!
//! ```rust,no_run
//! let path = rmapi_auto::ensure_rmapi(Some(&|downloaded, total| {
//!     if let Some(t) = total {
//!         eprint!("\rDownloading rmapi: {}/{} bytes", downloaded, t);
//!     }
//! })).expect("download failed");
//! println!("rmapi at {}", path.display());
//! ```
//!
//! ## Platform support
//!
//! | OS    | Arch    | Release asset               |
//! |-------|---------|-----------------------------|
//! | Linux | x86_64  | `rmapi-linux-amd64.tar.gz`  |
//! | Linux | aarch64 | `rmapi-linux-arm64.tar.gz`  |
//!
//! Elsewhere, install rmapi yourself and set `RMAPI_BIN`.
//!
//! ## Environment variable overrides
//!
//! - `RMAPI_BIN` — path to an existing rmapi binary; skips download.
//! - `RMAPI_AUTO_CACHE_DIR` — override the default cache directory.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Release download base; `latest` always points at the newest tag.
const BASE_URL: &str = "https://github.com/ddvk/rmapi/releases/latest/download";

/// Name of the executable inside the archive and on disk.
pub const BINARY_NAME: &str = "rmapi";

/// Install location used by earlier setups, relative to the working dir.
pub const LOCAL_INSTALL_DIR: &str = "bin";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by rmapi-auto operations.
#[derive(Error, Debug)]
pub enum RmapiAutoError {
    /// No prebuilt rmapi for this OS/architecture.
    #[error("No prebuilt rmapi for {os}/{arch}; install it and set RMAPI_BIN")]
    UnsupportedPlatform { os: String, arch: String },

    /// Could not create or write the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),
}

// ── Platform ─────────────────────────────────────────────────────────────────

/// Release asset name for this platform.
pub fn archive_name() -> Result<&'static str, RmapiAutoError> {
    archive_name_for(std::env::consts::OS, std::env::consts::ARCH)
}

fn archive_name_for(os: &str, arch: &str) -> Result<&'static str, RmapiAutoError> {
    match (os, arch) {
        ("linux", "x86_64") => Ok("rmapi-linux-amd64.tar.gz"),
        ("linux", "aarch64") => Ok("rmapi-linux-arm64.tar.gz"),
        (os, arch) => Err(RmapiAutoError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// Download URL for this platform's archive.
pub fn download_url() -> Result<String, RmapiAutoError> {
    Ok(format!("{}/{}", BASE_URL, archive_name()?))
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Directory holding the downloaded binary.
///
/// Default: `~/.cache/papershelf/rmapi/` (platform cache dir). Override by
/// setting `RMAPI_AUTO_CACHE_DIR`.
pub fn rmapi_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("RMAPI_AUTO_CACHE_DIR") {
        return PathBuf::from(override_dir).join("rmapi");
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("papershelf").join("rmapi")
}

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Path of an already available rmapi, without touching the network.
pub fn cached_rmapi_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("RMAPI_BIN") {
        let pb = PathBuf::from(p);
        if pb.is_file() {
            return Some(pb);
        }
    }
    let local = Path::new(LOCAL_INSTALL_DIR).join(BINARY_NAME);
    if local.is_file() {
        return Some(local);
    }
    let cached = rmapi_cache_dir().join(BINARY_NAME);
    cached.is_file().then_some(cached)
}

/// `true` when [`ensure_rmapi`] would not need to download anything.
pub fn is_rmapi_cached() -> bool {
    cached_rmapi_path().is_some()
}

/// Return the path to a usable rmapi binary, downloading it if needed.
///
/// `on_progress` receives `(bytes_downloaded, total_size_option)` during
/// the download. The download happens at most once per process.
pub fn ensure_rmapi(
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, RmapiAutoError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = match cached_rmapi_path() {
        Some(path) => path,
        None => install_rmapi(&rmapi_cache_dir(), on_progress)?,
    };

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Download the platform archive and install `rmapi` into `dir`.
///
/// Overwrites an existing binary. Returns the installed path.
pub fn install_rmapi(
    dir: &Path,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, RmapiAutoError> {
    let url = download_url()?;
    std::fs::create_dir_all(dir).map_err(RmapiAutoError::CacheDir)?;

    let archive = download_bytes(&url, on_progress)?;
    let dest = dir.join(BINARY_NAME);
    extract_binary(&archive, &dest)?;
    make_executable(&dest)?;
    Ok(dest)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Streams a URL into a `Vec<u8>`, calling `on_progress` every 64 KiB.
fn download_bytes(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, RmapiAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("rmapi-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| RmapiAutoError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| RmapiAutoError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(RmapiAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut buf = Vec::with_capacity(total.unwrap_or(8 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RmapiAutoError::Download(format!("Read error: {e}"))),
        }
    }

    Ok(buf)
}

/// Extracts the first entry whose file name is `rmapi` into `dest_path`.
///
/// The entry may sit at the archive root or in a subdirectory.
fn extract_binary(archive_bytes: &[u8], dest_path: &Path) -> Result<(), RmapiAutoError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(archive_bytes));

    for entry in archive
        .entries()
        .map_err(|e| RmapiAutoError::Extract(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| RmapiAutoError::Extract(e.to_string()))?;
        let is_binary = {
            let path = entry
                .path()
                .map_err(|e| RmapiAutoError::Extract(e.to_string()))?;
            entry.header().entry_type().is_file()
                && path.file_name().is_some_and(|n| n == BINARY_NAME)
        };
        if is_binary {
            entry
                .unpack(dest_path)
                .map_err(|e| RmapiAutoError::Extract(format!("Unpack failed: {e}")))?;
            return Ok(());
        }
    }

    Err(RmapiAutoError::Extract(format!(
        "'{BINARY_NAME}' not found in archive"
    )))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), RmapiAutoError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(RmapiAutoError::CacheDir)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), RmapiAutoError> {
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn asset_names_per_platform() {
        assert_eq!(
            archive_name_for("linux", "x86_64").unwrap(),
            "rmapi-linux-amd64.tar.gz"
        );
        assert_eq!(
            archive_name_for("linux", "aarch64").unwrap(),
            "rmapi-linux-arm64.tar.gz"
        );
        assert!(matches!(
            archive_name_for("plan9", "mips"),
            Err(RmapiAutoError::UnsupportedPlatform { .. })
        ));
    }

    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn download_url_points_at_latest_release() {
        let url = download_url().unwrap();
        assert!(url.starts_with("https://github.com/ddvk/rmapi/releases/latest/download/"));
        assert!(url.ends_with(".tar.gz"));
    }

    #[test]
    fn cache_dir_is_deterministic() {
        let d1 = rmapi_cache_dir();
        assert_eq!(d1, rmapi_cache_dir());
        assert!(d1.ends_with("rmapi"));
    }

    #[test]
    fn extract_finds_nested_binary() {
        let archive = tar_gz(&[
            ("README.md", b"docs".as_slice()),
            ("dist/rmapi", b"#!/bin/sh\necho rmapi\n".as_slice()),
        ]);
        let dir = std::env::temp_dir().join(format!("rmapi-auto-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join(BINARY_NAME);

        extract_binary(&archive, &dest).unwrap();
        make_executable(&dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"#!/bin/sh\necho rmapi\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn extract_reports_missing_binary() {
        let archive = tar_gz(&[("rmapi.md", b"not it".as_slice())]);
        let dest = std::env::temp_dir().join("rmapi-auto-never-written");
        let err = extract_binary(&archive, &dest).unwrap_err();
        assert!(matches!(err, RmapiAutoError::Extract(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn garbage_archive_is_extract_error() {
        let dest = std::env::temp_dir().join("rmapi-auto-garbage");
        assert!(matches!(
            extract_binary(b"not gzip", &dest),
            Err(RmapiAutoError::Extract(_))
        ));
    }
}
