use std::num::ParseIntError;

/// Error obtained when parsing an [`AccessRecord`](crate::AccessRecord) from a trace line
#[derive(Debug)]
pub enum ParseAccessError {
    WrongFieldCount { expected: usize, got: usize },
    BadThread(ParseIntError),
    MissingHexPrefix(String),
    BadAddress(ParseIntError),
    BadAllocId(ParseIntError),
    BadAllocOffset(ParseIntError),
    BadPc(ParseIntError),
    PcOutOfRange(i32, i32),
    BadSize(ParseIntError),
    BadCount(ParseIntError),
}

impl std::fmt::Display for ParseAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseAccessError::WrongFieldCount { expected, got } => f.write_fmt(format_args!(
                "expected {} comma-separated fields, got {}",
                expected, got
            )),
            ParseAccessError::BadThread(e) => f.write_fmt(format_args!("invalid thread id: {}", e)),
            ParseAccessError::MissingHexPrefix(s) => {
                f.write_fmt(format_args!("address `{}` is missing the 0x prefix", s))
            }
            ParseAccessError::BadAddress(e) => f.write_fmt(format_args!("invalid address: {}", e)),
            ParseAccessError::BadAllocId(e) => {
                f.write_fmt(format_args!("invalid allocation id: {}", e))
            }
            ParseAccessError::BadAllocOffset(e) => {
                f.write_fmt(format_args!("invalid allocation offset: {}", e))
            }
            ParseAccessError::BadPc(e) => f.write_fmt(format_args!("invalid pc field: {}", e)),
            ParseAccessError::PcOutOfRange(func, inst) => f.write_fmt(format_args!(
                "pc ({}, {}) out of the 16-bit id range",
                func, inst
            )),
            ParseAccessError::BadSize(e) => f.write_fmt(format_args!("invalid access size: {}", e)),
            ParseAccessError::BadCount(e) => {
                f.write_fmt(format_args!("invalid read/write count: {}", e))
            }
        }
    }
}

impl std::error::Error for ParseAccessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseAccessError::WrongFieldCount { .. } => None,
            ParseAccessError::BadThread(e) => Some(e),
            ParseAccessError::MissingHexPrefix(_) => None,
            ParseAccessError::BadAddress(e) => Some(e),
            ParseAccessError::BadAllocId(e) => Some(e),
            ParseAccessError::BadAllocOffset(e) => Some(e),
            ParseAccessError::BadPc(e) => Some(e),
            ParseAccessError::PcOutOfRange(..) => None,
            ParseAccessError::BadSize(e) => Some(e),
            ParseAccessError::BadCount(e) => Some(e),
        }
    }
}

/// Error obtained when parsing an [`AllocRecord`](crate::AllocRecord) from a metadata line
#[derive(Debug)]
pub enum ParseAllocError {
    WrongFieldCount { expected: usize, got: usize },
    BadId(ParseIntError),
    BadStart(ParseAccessError),
    BadSize(ParseIntError),
    BadPc(ParseIntError),
    PcOutOfRange(i32, i32),
}

impl std::fmt::Display for ParseAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseAllocError::WrongFieldCount { expected, got } => f.write_fmt(format_args!(
                "expected {} comma-separated fields, got {}",
                expected, got
            )),
            ParseAllocError::BadId(e) => f.write_fmt(format_args!("invalid allocation id: {}", e)),
            ParseAllocError::BadStart(e) => {
                f.write_fmt(format_args!("invalid start address: {}", e))
            }
            ParseAllocError::BadSize(e) => {
                f.write_fmt(format_args!("invalid allocation size: {}", e))
            }
            ParseAllocError::BadPc(e) => f.write_fmt(format_args!("invalid pc field: {}", e)),
            ParseAllocError::PcOutOfRange(func, inst) => f.write_fmt(format_args!(
                "pc ({}, {}) out of the 16-bit id range",
                func, inst
            )),
        }
    }
}

impl std::error::Error for ParseAllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseAllocError::WrongFieldCount { .. } => None,
            ParseAllocError::BadId(e) => Some(e),
            ParseAllocError::BadStart(e) => Some(e),
            ParseAllocError::BadSize(e) => Some(e),
            ParseAllocError::BadPc(e) => Some(e),
            ParseAllocError::PcOutOfRange(..) => None,
        }
    }
}

/// Error obtained when reading a full trace file
#[derive(Debug)]
pub enum TraceReadError {
    IoError(std::io::Error),
    ParseError {
        line: usize,
        error: ParseAccessError,
    },
}

impl std::fmt::Display for TraceReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceReadError::IoError(io) => f.write_fmt(format_args!("IO error: {}", io)),
            TraceReadError::ParseError { line, error } => {
                f.write_fmt(format_args!("parse error in line {}: {}", line, error))
            }
        }
    }
}

impl std::error::Error for TraceReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceReadError::IoError(io) => Some(io),
            TraceReadError::ParseError { error, .. } => Some(error),
        }
    }
}

impl From<std::io::Error> for TraceReadError {
    fn from(value: std::io::Error) -> Self {
        TraceReadError::IoError(value)
    }
}

/// Error obtained when reading a full allocation metadata file
#[derive(Debug)]
pub enum AllocReadError {
    IoError(std::io::Error),
    ParseError { line: usize, error: ParseAllocError },
}

impl std::fmt::Display for AllocReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocReadError::IoError(io) => f.write_fmt(format_args!("IO error: {}", io)),
            AllocReadError::ParseError { line, error } => {
                f.write_fmt(format_args!("parse error in line {}: {}", line, error))
            }
        }
    }
}

impl std::error::Error for AllocReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocReadError::IoError(io) => Some(io),
            AllocReadError::ParseError { error, .. } => Some(error),
        }
    }
}

impl From<std::io::Error> for AllocReadError {
    fn from(value: std::io::Error) -> Self {
        AllocReadError::IoError(value)
    }
}
