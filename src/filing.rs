//! Remote filing engine: put one PDF into `/papers/<category>/<name>.pdf`.
//!
//! The sequence for every paper is:
//!
//! ```text
//! ensure_directory ──▶ put ──▶ rename (only if the uploaded name differs)
//!  ls / mkdir          rmapi put       rmapi mv
//! ```
//!
//! Each step must succeed before the next one runs. The engine is
//! best-effort idempotent, not transactional: a failed rename leaves the
//! upload in place under its original name and is reported as
//! [`PaperError::RenameFailed`]. Nothing is retried or rolled back.
//!
//! A dry run takes every decision and logs it, including the listings, but
//! never calls `mkdir`, `put` or `mv`. It returns the receipt a live run
//! would have produced against the same remote state.

use crate::bridge::RemoteBridge;
use crate::config::FilerConfig;
use crate::error::PaperError;
use crate::pipeline::classify::{source_stem, ClassificationSource, Classifier};
use crate::pipeline::filename::{strip_extension, to_filename};
use crate::progress::{FilingStage, NoopProgressCallback, ProgressCallback};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// What the caller already knows about a paper.
///
/// Missing `title` or `category` triggers classification. `filename`
/// overrides the name derived from the title.
#[derive(Debug, Clone, Default)]
pub struct FilingHints {
    pub title: Option<String>,
    pub category: Option<String>,
    pub filename: Option<String>,
}

/// Result of a successful (or successfully simulated) filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilingReceipt {
    /// Full remote path of the filed document.
    pub remote_path: String,
    pub category: String,
    pub filename: String,
    /// Name the bridge gave the upload before any rename.
    pub uploaded_as: String,
    pub renamed: bool,
    pub dry_run: bool,
    pub classification: ClassificationSource,
    /// Directories created (or, in a dry run, that would be created).
    pub created_dirs: Vec<String>,
}

/// Outcome of [`FilingEngine::ensure_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredDirectory {
    pub path: String,
    pub created: Vec<String>,
}

/// Files local PDFs on the remote store through a [`RemoteBridge`].
pub struct FilingEngine {
    bridge: Arc<dyn RemoteBridge>,
    classifier: Classifier,
    remote_root: String,
    progress: ProgressCallback,
}

impl std::fmt::Debug for FilingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilingEngine")
            .field("remote_root", &self.remote_root)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl FilingEngine {
    pub fn new(
        bridge: Arc<dyn RemoteBridge>,
        classifier: Classifier,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            bridge,
            classifier,
            remote_root: remote_root.into().trim_end_matches('/').to_string(),
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Engine with the oracle, root and progress callback from `config`.
    pub fn from_config(bridge: Arc<dyn RemoteBridge>, config: &FilerConfig) -> Self {
        let engine = Self::new(bridge, Classifier::from_config(config), &config.remote_root);
        match config.progress_callback {
            Some(ref cb) => engine.with_progress(Arc::clone(cb)),
            None => engine,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Remote directory for `category`.
    pub fn category_dir(&self, category: &str) -> String {
        format!("{}/{}", self.remote_root, category)
    }

    /// Make sure `<root>/<category>` exists, creating each missing level.
    ///
    /// Each level is checked with an exact-name match on the parent's
    /// listing. A directory created in this call is not listed again. In a
    /// dry run `mkdir` is skipped and the would-be-created paths are reported.
    pub async fn ensure_directory(
        &self,
        category: &str,
        dry_run: bool,
    ) -> Result<EnsuredDirectory, PaperError> {
        validate_category(category)?;
        let target = self.category_dir(category);

        let mut parent = String::from("/");
        let mut created = Vec::new();
        let mut parent_is_new = false;

        for component in target.split('/').filter(|c| !c.is_empty()) {
            let path = join(&parent, component);

            let exists = if parent_is_new {
                false
            } else {
                let listing = self.bridge.list(&parent).await.map_err(|source| {
                    PaperError::DirectoryEnsure {
                        path: target.clone(),
                        source,
                    }
                })?;
                listing.contains_dir(component)
            };

            if exists {
                debug!("Remote directory exists: {}", path);
            } else if dry_run {
                info!("[dry run] Would create remote directory {}", path);
                created.push(path.clone());
                parent_is_new = true;
            } else {
                info!("Creating remote directory {}", path);
                self.bridge
                    .make_dir(&path)
                    .await
                    .map_err(|source| PaperError::DirectoryEnsure {
                        path: target.clone(),
                        source,
                    })?;
                created.push(path.clone());
                parent_is_new = true;
            }

            parent = path;
        }

        Ok(EnsuredDirectory {
            path: target,
            created,
        })
    }

    /// Upload `local` into `<root>/<category>/` and name it `filename`.
    ///
    /// The directory is ensured first; a failure there aborts before upload.
    pub async fn place(
        &self,
        local: &Path,
        category: &str,
        filename: &str,
        dry_run: bool,
    ) -> Result<FilingReceipt, PaperError> {
        self.place_as(local, category, filename, dry_run, ClassificationSource::Supplied)
            .await
    }

    async fn place_as(
        &self,
        local: &Path,
        category: &str,
        filename: &str,
        dry_run: bool,
        classification: ClassificationSource,
    ) -> Result<FilingReceipt, PaperError> {
        require_file(local)?;

        self.progress.on_stage(FilingStage::EnsuringDirectory);
        let dir = self.ensure_directory(category, dry_run).await?;

        let uploaded_as = source_stem(local);
        let target_stem = strip_extension(filename);

        self.progress.on_stage(FilingStage::Uploading);
        if dry_run {
            info!(
                "[dry run] Would upload {} to {}/",
                local.display(),
                dir.path
            );
        } else {
            info!("Uploading {} to {}/", local.display(), dir.path);
            self.bridge
                .put(local, &dir.path)
                .await
                .map_err(|source| PaperError::UploadFailed {
                    local: local.to_path_buf(),
                    remote_dir: dir.path.clone(),
                    source,
                })?;
        }

        let renamed = uploaded_as != target_stem;
        if renamed {
            let src = join(&dir.path, &uploaded_as);
            let dst = join(&dir.path, target_stem);
            self.progress.on_stage(FilingStage::Renaming);
            if dry_run {
                info!("[dry run] Would rename {} to {}", src, dst);
            } else {
                info!("Renaming {} to {}", src, dst);
                if let Err(source) = self.bridge.rename(&src, &dst).await {
                    return Err(PaperError::RenameFailed {
                        uploaded: src,
                        target: dst,
                        source,
                    });
                }
            }
        }

        let remote_path = join(&dir.path, filename);
        info!(
            "{}Filed {} as {}",
            if dry_run { "[dry run] " } else { "" },
            local.display(),
            remote_path
        );

        Ok(FilingReceipt {
            remote_path,
            category: category.to_string(),
            filename: filename.to_string(),
            uploaded_as,
            renamed,
            dry_run,
            classification,
            created_dirs: dir.created,
        })
    }

    /// File `local`, classifying it first when the hints lack a title or
    /// category. Supplied values always win over classified ones.
    pub async fn file(
        &self,
        local: &Path,
        hints: FilingHints,
        dry_run: bool,
    ) -> Result<FilingReceipt, PaperError> {
        require_file(local)?;

        let (category, title, source) = match (hints.category, hints.title) {
            (Some(category), Some(title)) => (category, title, ClassificationSource::Supplied),
            (category, title) => {
                self.progress.on_stage(FilingStage::Classifying);
                let classification = self.classifier.classify_file(local).await.map_err(|e| {
                    PaperError::SourceUnreadable {
                        path: local.to_path_buf(),
                        source: e,
                    }
                })?;
                let source = classification.source();
                let result = classification.into_result();
                (
                    category.unwrap_or(result.category),
                    title.unwrap_or(result.title),
                    source,
                )
            }
        };

        let filename = hints.filename.unwrap_or_else(|| to_filename(&title));
        self.place_as(local, &category, &filename, dry_run, source)
            .await
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn require_file(local: &Path) -> Result<(), PaperError> {
    if local.is_file() {
        Ok(())
    } else {
        Err(PaperError::SourceNotFound {
            path: local.to_path_buf(),
        })
    }
}

fn validate_category(category: &str) -> Result<(), PaperError> {
    if category.is_empty() || category.contains('/') || category == "." || category == ".." {
        return Err(PaperError::InvalidConfig(format!(
            "'{category}' is not a usable category folder name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Listing;
    use crate::error::{BridgeError, OracleError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Bridge that answers every listing with the same text and records calls.
    struct Fixed {
        listing: &'static str,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteBridge for Fixed {
        async fn list(&self, path: &str) -> Result<Listing, BridgeError> {
            self.calls.lock().unwrap().push(format!("ls {path}"));
            Ok(Listing::parse(self.listing))
        }
        async fn make_dir(&self, path: &str) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push(format!("mkdir {path}"));
            Ok(())
        }
        async fn put(&self, local: &Path, remote_dir: &str) -> Result<(), BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("put {} {remote_dir}", local.display()));
            Ok(())
        }
        async fn rename(&self, src: &str, dst: &str) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push(format!("mv {src} {dst}"));
            Ok(())
        }
    }

    fn engine(listing: &'static str) -> (FilingEngine, Arc<Fixed>) {
        let bridge = Arc::new(Fixed {
            listing,
            calls: Mutex::new(Vec::new()),
        });
        let classifier = Classifier::new(
            Err(OracleError::MissingCredentials {
                provider: "test".into(),
                hint: String::new(),
            }),
            None,
        );
        (
            FilingEngine::new(bridge.clone(), classifier, "/papers/"),
            bridge,
        )
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("/", "papers"), "/papers");
        assert_eq!(join("/papers", "Physics"), "/papers/Physics");
    }

    #[test]
    fn root_trailing_slash_trimmed() {
        let (engine, _) = engine("");
        assert_eq!(engine.category_dir("Physics"), "/papers/Physics");
    }

    #[tokio::test]
    async fn existing_levels_are_only_listed() {
        let (engine, bridge) = engine("[d]\tpapers\n[d]\tPhysics\n");
        let dir = engine.ensure_directory("Physics", false).await.unwrap();
        assert!(dir.created.is_empty());
        assert_eq!(*bridge.calls.lock().unwrap(), vec!["ls /", "ls /papers"]);
    }

    #[tokio::test]
    async fn new_parent_is_not_listed_again() {
        let (engine, bridge) = engine("");
        let dir = engine.ensure_directory("Physics", false).await.unwrap();
        assert_eq!(dir.created, vec!["/papers", "/papers/Physics"]);
        assert_eq!(
            *bridge.calls.lock().unwrap(),
            vec!["ls /", "mkdir /papers", "mkdir /papers/Physics"]
        );
    }

    #[tokio::test]
    async fn bad_category_rejected_before_any_call() {
        let (engine, bridge) = engine("");
        for bad in ["", "a/b", ".."] {
            assert!(matches!(
                engine.ensure_directory(bad, false).await,
                Err(PaperError::InvalidConfig(_))
            ));
        }
        assert!(bridge.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_source_fails_before_bridge() {
        let (engine, bridge) = engine("");
        let err = engine
            .place(Path::new("/nonexistent/paper.pdf"), "Physics", "x.pdf", false)
            .await
            .unwrap_err();
        assert!(matches!(err, PaperError::SourceNotFound { .. }));
        assert!(bridge.calls.lock().unwrap().is_empty());
    }
}
