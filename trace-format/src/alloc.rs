use crate::access::parse_hex_addr;
use crate::error::ParseAllocError;
use crate::pc::Pc;

use std::str::FromStr;

/// Identity and static origin of one heap allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AllocRecord {
    pub id: i64,
    pub start: u64,
    pub size: u64,
    /// Allocation site; null for allocations not tracked back to source
    /// (globals, startup allocations).
    pub pc: Pc,
}

const ALLOC_FIELDS: usize = 5;

impl FromStr for AllocRecord {
    type Err = ParseAllocError;

    /// Parse one allocation metadata line: `id,start_hex,size,funcId,instId`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split(',').collect::<Vec<_>>();
        if fields.len() != ALLOC_FIELDS {
            return Err(ParseAllocError::WrongFieldCount {
                expected: ALLOC_FIELDS,
                got: fields.len(),
            });
        }

        let id = fields[0].parse::<i64>().map_err(ParseAllocError::BadId)?;
        let start = parse_hex_addr(fields[1]).map_err(ParseAllocError::BadStart)?;
        let size = fields[2].parse::<u64>().map_err(ParseAllocError::BadSize)?;
        let func = fields[3].parse::<i32>().map_err(ParseAllocError::BadPc)?;
        let inst = fields[4].parse::<i32>().map_err(ParseAllocError::BadPc)?;
        let pc = Pc::from_signed(func, inst).ok_or(ParseAllocError::PcOutOfRange(func, inst))?;

        Ok(AllocRecord {
            id,
            start,
            size,
            pc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_parse() {
        assert_eq!(
            "7,0x7f0000,256,3,12".parse::<AllocRecord>().unwrap(),
            AllocRecord {
                id: 7,
                start: 0x7f0000,
                size: 256,
                pc: Pc::new(3, 12),
            }
        );
        // global allocation with no known call site
        assert_eq!(
            "0,0x400000,4096,-1,-1".parse::<AllocRecord>().unwrap(),
            AllocRecord {
                id: 0,
                start: 0x400000,
                size: 4096,
                pc: Pc::null(),
            }
        );
    }

    #[test]
    fn err_parse() {
        assert!(matches!(
            "7,0x7f0000,256,3".parse::<AllocRecord>(),
            Err(ParseAllocError::WrongFieldCount { .. }),
        ));
        assert!(matches!(
            "7,7f0000,256,3,12".parse::<AllocRecord>(),
            Err(ParseAllocError::BadStart(_)),
        ));
        assert!(matches!(
            "7,0x7f0000,big,3,12".parse::<AllocRecord>(),
            Err(ParseAllocError::BadSize(_)),
        ));
    }
}
