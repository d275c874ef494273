//! Pipeline stages that turn one input into a name and a category.
//!
//! Each submodule is one step and can be tested on its own; the remote side
//! effects live in [`crate::filing`] and [`crate::intake`].
//!
//! ## Data Flow
//!
//! ```text
//!   "2301.12345" ──▶ identifier ──▶ metadata + PDF ─┐
//!                                                    ├──▶ filename ──▶ filing
//!   "./paper.pdf" ──▶ reduce ──▶ classify ───────────┘
//!                    (pdfium)   (oracle)
//! ```
//!
//! 1. [`identifier`] — recognise arXiv IDs, fetch Atom metadata, download PDFs
//! 2. [`reduce`]     — cut the document down to page one; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`classify`]   — ask the oracle for a category and title, or fall back
//! 4. [`filename`]   — sanitise a title into a device-safe document name

pub mod classify;
pub mod filename;
pub mod identifier;
pub mod reduce;
