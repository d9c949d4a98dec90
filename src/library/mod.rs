//! Persistent record of completed conversions.
//!
//! # Storage Layout
//!
//! ```text
//! ~/.enPDF2zhMD/
//! ├── config.json        # Settings
//! ├── history.json       # Completed conversions, newest first
//! └── temp/
//!     └── <session_id>/  # Per-run workspace
//! ```

pub mod history;

pub use history::{HistoryEntry, HistoryStore, MAX_HISTORY_ENTRIES};
