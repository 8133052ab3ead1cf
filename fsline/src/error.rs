//! Error types for the detection and repair engine

use crate::segment::Segment;

use std::num::ParseIntError;

use trace_format::Pc;

/// `fsline` result type
pub type FsResult<T> = std::result::Result<T, FsError>;

/// `fsline` error type
#[derive(Debug)]
pub enum FsError {
    /// An error with IO occurred
    IoError(std::io::Error),

    /// Ill-formed detect API file (the Detect -> Repair bridge)
    BadApiFile { token: usize, error: TokenError },

    /// Ill-formed static-analysis hint file
    BadAnalysisFile { token: usize, error: TokenError },

    /// An access range falls outside its declared allocation
    AccessOutOfBounds {
        alloc_id: i64,
        range: Segment,
        size: u64,
    },

    /// A layout invariant was violated while repairing one allocation
    Layout { alloc_pc: Pc, error: LayoutError },
}

/// Error consuming one whitespace-separated token
#[derive(Debug)]
pub enum TokenError {
    UnexpectedEof,
    BadInt(ParseIntError),
}

/// Invariant violations inside the layout repair engine
///
/// These abort the offending allocation only; the run continues.
#[derive(Debug)]
pub enum LayoutError {
    /// Extrapolation needs at least two observed ranges in a main-group list
    ShortMainList { pc: Pc },

    /// Extrapolation needs a single-segment list for this `(pc, thread)` pair
    MissingThreadList { pc: Pc, thread: u32 },

    /// An observed segment is not covered by any remapped region
    UnmappedSegment(Segment),
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("fsline error: ")?;
        match self {
            FsError::IoError(io) => f.write_fmt(format_args!("{}", io)),
            FsError::BadApiFile { token, error } => f.write_fmt(format_args!(
                "bad detect api file (token = {}): {}",
                token, error
            )),
            FsError::BadAnalysisFile { token, error } => f.write_fmt(format_args!(
                "bad analysis hint file (token = {}): {}",
                token, error
            )),
            FsError::AccessOutOfBounds {
                alloc_id,
                range,
                size,
            } => f.write_fmt(format_args!(
                "access range [{}; {}) outside allocation {} of size {}",
                range.start, range.end, alloc_id, size
            )),
            FsError::Layout { alloc_pc, error } => f.write_fmt(format_args!(
                "layout failure for allocation at pc ({}): {}",
                alloc_pc, error
            )),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::IoError(io) => Some(io),
            FsError::BadApiFile { error, .. } => Some(error),
            FsError::BadAnalysisFile { error, .. } => Some(error),
            FsError::AccessOutOfBounds { .. } => None,
            FsError::Layout { error, .. } => Some(error),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(value: std::io::Error) -> Self {
        FsError::IoError(value)
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::UnexpectedEof => f.write_str("unexpected end of file"),
            TokenError::BadInt(e) => f.write_fmt(format_args!("invalid integer: {}", e)),
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TokenError::UnexpectedEof => None,
            TokenError::BadInt(e) => Some(e),
        }
    }
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::ShortMainList { pc } => f.write_fmt(format_args!(
                "main-group list for pc ({}) has fewer than two ranges",
                pc
            )),
            LayoutError::MissingThreadList { pc, thread } => f.write_fmt(format_args!(
                "no single-segment list for pc ({}) thread {}",
                pc, thread
            )),
            LayoutError::UnmappedSegment(seg) => f.write_fmt(format_args!(
                "segment [{}; {}) not covered by the remapping",
                seg.start, seg.end
            )),
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
