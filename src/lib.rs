//! # papershelf
//!
//! File research papers onto a reMarkable tablet, sorted into folders by
//! subject, with human-readable names.
//!
//! ## Why this crate?
//!
//! Papers arrive as `2301.12345v2.pdf` or `paper(3).pdf`. On the device that
//! is a wall of meaningless names in one folder. This crate gives each paper
//! a title and a category, then files it as `/papers/<Category>/<Title>.pdf`
//! through the `rmapi` bridge.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input
//!  │
//!  ├─ 1. Resolve   arXiv ID / URL?  → Atom metadata + PDF download
//!  │               anything else    → local path
//!  ├─ 2. Classify  oracle reads page one → (category, title), or fallback
//!  ├─ 3. Name      title → "Some Title.pdf"
//!  └─ 4. File      ls / mkdir → put → mv   (rmapi)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use papershelf::{Dispatcher, FilerConfig, RmapiBridge};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Oracle credentials from ANTHROPIC_API_KEY
//!     let config = FilerConfig::builder()
//!         .api_key(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let bridge = Arc::new(RmapiBridge::new(config.bridge.clone()));
//!     let dispatcher = Dispatcher::from_config(bridge, &config)?;
//!
//!     let receipt = dispatcher.dispatch("2301.12345", true).await?;
//!     println!("would file as {}", receipt.remote_path);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `papershelf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! papershelf = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bridge;
pub mod config;
pub mod error;
pub mod filing;
pub mod intake;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bridge::{EntryKind, Listing, ListingEntry, RemoteBridge, RmapiBridge};
pub use config::{BridgeConfig, FilerConfig, FilerConfigBuilder, OracleConfig};
pub use error::{
    BridgeError, BridgeErrorKind, BridgeOp, OracleError, PaperError, ReduceError, ResolveError,
};
pub use filing::{EnsuredDirectory, FilingEngine, FilingHints, FilingReceipt};
pub use intake::{DocumentInput, Dispatcher, EXIT_FAILURE, EXIT_SUCCESS};
pub use oracle::{build_oracle, AnthropicOracle, ClassificationOracle, VisionOracle};
pub use pipeline::classify::{
    Classification, ClassificationResult, ClassificationSource, Classifier, FALLBACK_CATEGORY,
};
pub use pipeline::filename::{shorten, to_filename};
pub use pipeline::identifier::{resolve, ArxivClient, ArxivId, DownloadedPaper, PaperMetadata};
pub use progress::{FilingProgressCallback, FilingStage, NoopProgressCallback, ProgressCallback};
