use crate::access::AccessRecord;
use crate::alloc::AllocRecord;
use crate::error::{AllocReadError, TraceReadError};

use std::io::BufRead;

/// Read a full recorded access trace
///
/// A corrupt line is fatal: downstream grouping assumes total coverage of the
/// file, so there is no skip-and-continue recovery.
pub fn read_trace<BR: BufRead>(reader: BR) -> Result<Vec<AccessRecord>, TraceReadError> {
    reader
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(l) if l.is_empty()))
        .map(|(idx, line)| {
            (line?)
                .parse()
                .map_err(|error| TraceReadError::ParseError { line: idx, error })
        })
        .collect::<Result<Vec<_>, _>>()
}

/// Read the full allocation metadata file
pub fn read_allocs<BR: BufRead>(reader: BR) -> Result<Vec<AllocRecord>, AllocReadError> {
    reader
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(l) if l.is_empty()))
        .map(|(idx, line)| {
            (line?)
                .parse()
                .map_err(|error| AllocReadError::ParseError { line: idx, error })
        })
        .collect::<Result<Vec<_>, _>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pc::Pc;

    #[test]
    fn trace_round() {
        let input = "0,0x40,1,0,2,3,8,1,0\n\n1,0x48,1,8,2,4,8,0,1\n";
        let trace = read_trace(input.as_bytes()).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].thread, 0);
        assert_eq!(trace[1].pc, Pc::new(2, 4));
    }

    #[test]
    fn trace_fatal_on_bad_line() {
        let input = "0,0x40,1,0,2,3,8,1,0\n0,40,1,0,2,3,8,1,0\n";
        assert!(matches!(
            read_trace(input.as_bytes()),
            Err(TraceReadError::ParseError { line: 1, .. }),
        ));
    }

    #[test]
    fn allocs() {
        let input = "0,0x1000,64,1,2\n1,0x2000,128,-1,-1\n";
        let allocs = read_allocs(input.as_bytes()).unwrap();
        assert_eq!(allocs.len(), 2);
        assert_eq!(allocs[0].size, 64);
        assert!(allocs[1].pc.is_null());
    }
}
