//! # `trace-format`
//!
//! `trace-format` parses the files emitted by the instrumentation runtime:
//! the raw memory-access trace (one CSV line per access) and the heap
//! allocation metadata file.

pub mod error;

mod access;
mod alloc;
mod pc;
mod trace;

pub use access::{AccessRecord, Rw};
pub use alloc::AllocRecord;
pub use pc::Pc;
pub use trace::{read_allocs, read_trace};
