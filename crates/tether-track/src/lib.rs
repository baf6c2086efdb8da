//! Position translation and breakpoint line tracking.
//!
//! This crate keeps a breakpoint's stored line correct while the document
//! underneath it is edited:
//!
//! - [`LineSet`] maps original line numbers to current line numbers for one
//!   document version, updated incrementally through every edit.
//! - [`SnapshotRegistry`] hands out opaque [`StampId`] tokens ("the document
//!   state as of now") and translates lines through them, best-effort.
//! - [`LineTrackerSet`] re-anchors line breakpoints after edits settle,
//!   using a quiescence-based debounce, and moves breakpoints off
//!   whitespace-only lines.

mod config;
mod line_set;
mod snapshots;
mod tracker;

pub use config::TrackConfig;
pub use line_set::LineSet;
pub use snapshots::{SnapshotRegistry, StampId};
pub use tracker::LineTrackerSet;
