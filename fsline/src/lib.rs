//! # `fsline`
//!
//! `fsline` is a library for detecting and repairing false sharing from
//! memory-access traces.
//!
//! The detection side groups trace records by heap allocation and 64-byte
//! cache line and estimates a false-sharing cost per line; the repair side
//! computes a padded relayout that places regions with distinct thread
//! affinity on distinct cache lines, together with the old-to-new offset
//! redirections a code patcher needs to apply it.

pub mod analysis;
pub mod api;
pub mod bucket;
pub mod detect;
pub mod error;
pub mod graph;
pub mod layout;
pub mod repair;
pub mod segment;
pub mod threadset;

pub use error::{FsError, FsResult};
pub use segment::Segment;
pub use threadset::ThreadSet;
