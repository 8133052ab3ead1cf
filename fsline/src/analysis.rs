//! Static-analysis hint file
//!
//! Supports arrays of structs: for an allocation site with a known
//! per-element stride, accesses can be normalized modulo that stride before
//! layout. Blocks repeat until EOF: `mfunc minst elemsize n`, then `n`
//! entries of `ifunc iinst start end`.

use crate::api::Tokens;
use crate::error::{FsError, FsResult, TokenError};
use crate::segment::Segment;

use std::collections::BTreeMap;
use std::io::BufRead;

use trace_format::Pc;

#[derive(Debug, Default, Clone)]
pub struct AnalysisHints {
    /// Per-element size, keyed by allocation-site pc
    elem_size: BTreeMap<Pc, u64>,
    /// Replacement segment, keyed by accessing pc
    pc_replace: BTreeMap<Pc, Segment>,
}

impl AnalysisHints {
    pub fn read<BR: BufRead>(mut reader: BR) -> FsResult<Self> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    pub fn parse(input: &str) -> FsResult<Self> {
        let mut tokens = Tokens::new(input);
        let mut hints = AnalysisHints::default();
        while let Some(first) = tokens.try_next() {
            let mfunc = first.parse::<u16>().map_err(|e| FsError::BadAnalysisFile {
                token: tokens.consumed(),
                error: TokenError::BadInt(e),
            })?;
            let minst = hint_token(&mut tokens, Tokens::next_u16)?;
            let elem_size = hint_token(&mut tokens, Tokens::next_u64)?;
            let n_entries = hint_token(&mut tokens, Tokens::next_u64)?;
            hints.elem_size.insert(Pc::new(mfunc, minst), elem_size);
            for _ in 0..n_entries {
                let pc = hint_token(&mut tokens, Tokens::next_pc)?;
                let seg = hint_token(&mut tokens, Tokens::next_segment)?;
                hints.pc_replace.insert(pc, seg);
            }
        }
        Ok(hints)
    }

    pub fn is_empty(&self) -> bool {
        self.pc_replace.is_empty()
    }

    pub fn elem_size_of(&self, alloc_pc: Pc) -> Option<u64> {
        self.elem_size.get(&alloc_pc).copied()
    }

    pub fn replacement_for(&self, access_pc: Pc) -> Option<Segment> {
        self.pc_replace.get(&access_pc).copied()
    }
}

fn hint_token<'a, T>(
    tokens: &mut Tokens<'a>,
    read: impl FnOnce(&mut Tokens<'a>) -> Result<T, TokenError>,
) -> FsResult<T> {
    read(tokens).map_err(|error| FsError::BadAnalysisFile {
        token: tokens.consumed(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blocks() {
        let input = "3 7 32 2\n1 2 0 8\n1 3 8 16\n4 0 64 0\n";
        let hints = AnalysisHints::parse(input).unwrap();
        assert!(!hints.is_empty());
        assert_eq!(hints.elem_size_of(Pc::new(3, 7)), Some(32));
        assert_eq!(hints.elem_size_of(Pc::new(4, 0)), Some(64));
        assert_eq!(hints.elem_size_of(Pc::new(9, 9)), None);
        assert_eq!(
            hints.replacement_for(Pc::new(1, 3)),
            Some(Segment::new(8, 16))
        );
    }

    #[test]
    fn empty_file() {
        let hints = AnalysisHints::parse("").unwrap();
        assert!(hints.is_empty());
    }

    #[test]
    fn truncated_block() {
        assert!(matches!(
            AnalysisHints::parse("3 7 32"),
            Err(FsError::BadAnalysisFile {
                error: TokenError::UnexpectedEof,
                ..
            }),
        ));
    }
}
