//! Progress-callback trait for filing events.
//!
//! Inject an [`Arc<dyn FilingProgressCallback>`] via
//! [`crate::config::FilerConfigBuilder::progress_callback`] to hear about each
//! stage of the pipeline as it starts. The CLI uses it to drive a spinner;
//! library callers can forward events wherever they like.
//!
//! # Example
//!
//! ```rust
//! use papershelf::{FilerConfig, FilingProgressCallback, FilingStage};
//! use std::sync::{Arc, Mutex};
//!
//! struct StageLog(Mutex<Vec<FilingStage>>);
//!
//! impl FilingProgressCallback for StageLog {
//!     fn on_stage(&self, stage: FilingStage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let log = Arc::new(StageLog(Mutex::new(Vec::new())));
//! let config = FilerConfig::builder()
//!     .progress_callback(log as Arc<dyn FilingProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// One step of the intake/filing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FilingStage {
    /// Deciding whether the input is an arXiv reference or a local path.
    Resolving,
    /// Querying the arXiv API for title and subject.
    FetchingMetadata,
    /// Downloading the PDF.
    Downloading,
    /// Asking the oracle for a category and title.
    Classifying,
    /// Listing and creating `/papers/<category>`.
    EnsuringDirectory,
    /// `rmapi put`.
    Uploading,
    /// `rmapi mv`.
    Renaming,
}

impl fmt::Display for FilingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilingStage::Resolving => "Resolving input",
            FilingStage::FetchingMetadata => "Fetching arXiv metadata",
            FilingStage::Downloading => "Downloading PDF",
            FilingStage::Classifying => "Classifying",
            FilingStage::EnsuringDirectory => "Preparing folders",
            FilingStage::Uploading => "Uploading",
            FilingStage::Renaming => "Renaming",
        })
    }
}

/// Called by the pipeline as it moves through each [`FilingStage`].
///
/// All methods default to no-ops so callers only override what they need.
pub trait FilingProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage(&self, stage: FilingStage) {
        let _ = stage;
    }

    /// Called once the paper sits at `remote_path` (or would, in a dry run).
    fn on_complete(&self, remote_path: &str, dry_run: bool) {
        let _ = (remote_path, dry_run);
    }

    /// Called once when the pipeline gives up.
    fn on_failed(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FilingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FilerConfig`].
pub type ProgressCallback = Arc<dyn FilingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<FilingStage>>,
        completed: Mutex<Option<(String, bool)>>,
        failed: Mutex<Option<String>>,
    }

    impl FilingProgressCallback for Recorder {
        fn on_stage(&self, stage: FilingStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_complete(&self, remote_path: &str, dry_run: bool) {
            *self.completed.lock().unwrap() = Some((remote_path.to_string(), dry_run));
        }

        fn on_failed(&self, error: &str) {
            *self.failed.lock().unwrap() = Some(error.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage(FilingStage::Uploading);
        cb.on_complete("/papers/Physics/x.pdf", false);
        cb.on_failed("boom");
    }

    #[test]
    fn recorder_receives_events_through_arc_dyn() {
        let rec = Arc::new(Recorder::default());
        let cb: ProgressCallback = rec.clone();
        cb.on_stage(FilingStage::Classifying);
        cb.on_stage(FilingStage::Uploading);
        cb.on_complete("/papers/Physics/x.pdf", true);
        cb.on_failed("later failure");

        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![FilingStage::Classifying, FilingStage::Uploading]
        );
        assert_eq!(
            *rec.completed.lock().unwrap(),
            Some(("/papers/Physics/x.pdf".to_string(), true))
        );
        assert_eq!(rec.failed.lock().unwrap().as_deref(), Some("later failure"));
    }

    #[test]
    fn stage_display_is_human_readable() {
        assert_eq!(FilingStage::EnsuringDirectory.to_string(), "Preparing folders");
    }
}
