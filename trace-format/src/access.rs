use crate::error::ParseAccessError;
use crate::pc::Pc;

use std::str::FromStr;

/// Aggregate read/write counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Rw {
    pub reads: u32,
    pub writes: u32,
}

impl Rw {
    pub const fn new(reads: u32, writes: u32) -> Self {
        Rw { reads, writes }
    }
}

impl std::ops::AddAssign for Rw {
    fn add_assign(&mut self, rhs: Self) {
        self.reads += rhs.reads;
        self.writes += rhs.writes;
    }
}

/// One observed memory access (or pre-aggregated group of accesses).
///
/// Raw per-access trace lines carry exactly one of `reads = 1` or
/// `writes = 1`; aggregated lines may carry arbitrary counts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub thread: u16,
    pub addr: u64,
    /// Owning heap allocation; `-1` means the access was not on the tracked heap.
    pub alloc_id: i64,
    pub pc: Pc,
    pub size: u16,
    pub rw: Rw,
}

pub(crate) const ACCESS_FIELDS: usize = 9;

pub(crate) fn parse_hex_addr(field: &str) -> Result<u64, ParseAccessError> {
    let hex = field
        .strip_prefix("0x")
        .ok_or_else(|| ParseAccessError::MissingHexPrefix(field.to_string()))?;
    u64::from_str_radix(hex, 0x10).map_err(ParseAccessError::BadAddress)
}

impl FromStr for AccessRecord {
    type Err = ParseAccessError;

    /// Parse one trace line:
    ///
    /// `thread,address_hex,allocId,allocOffset,funcId,instId,size,reads,writes`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split(',').collect::<Vec<_>>();
        if fields.len() != ACCESS_FIELDS {
            return Err(ParseAccessError::WrongFieldCount {
                expected: ACCESS_FIELDS,
                got: fields.len(),
            });
        }

        let thread = fields[0]
            .parse::<u16>()
            .map_err(ParseAccessError::BadThread)?;
        let addr = parse_hex_addr(fields[1])?;
        let alloc_id = fields[2]
            .parse::<i64>()
            .map_err(ParseAccessError::BadAllocId)?;
        // the per-allocation offset is carried by the instrumentation but the
        // engine recomputes it from the allocation start address
        let _offset = fields[3]
            .parse::<i64>()
            .map_err(ParseAccessError::BadAllocOffset)?;
        let func = fields[4].parse::<i32>().map_err(ParseAccessError::BadPc)?;
        let inst = fields[5].parse::<i32>().map_err(ParseAccessError::BadPc)?;
        let pc = Pc::from_signed(func, inst).ok_or(ParseAccessError::PcOutOfRange(func, inst))?;
        let size = fields[6]
            .parse::<u16>()
            .map_err(ParseAccessError::BadSize)?;
        let reads = fields[7]
            .parse::<u32>()
            .map_err(ParseAccessError::BadCount)?;
        let writes = fields[8]
            .parse::<u32>()
            .map_err(ParseAccessError::BadCount)?;

        Ok(AccessRecord {
            thread,
            addr,
            alloc_id,
            pc,
            size,
            rw: Rw::new(reads, writes),
        })
    }
}
