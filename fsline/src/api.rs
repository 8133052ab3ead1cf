//! Machine-readable bridge between the detect and repair passes
//!
//! One block per allocation: `func inst size count`, then `count` lines of
//! `start end func inst thread`. The file starts with the block count.

use crate::error::{FsError, FsResult, TokenError};
use crate::segment::Segment;

use std::io::{BufRead, Write};

use trace_format::Pc;

/// One observed access: allocation-relative range, observing pc, thread
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiAccess {
    pub range: Segment,
    pub pc: Pc,
    pub thread: u32,
}

/// Everything repair needs to know about one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocAccesses {
    /// Defining (allocation-site) pc
    pub pc: Pc,
    pub size: u64,
    pub accesses: Vec<ApiAccess>,
}

pub fn write_api<W: Write>(writer: &mut W, allocs: &[AllocAccesses]) -> std::io::Result<()> {
    writeln!(writer, "{}", allocs.len())?;
    for alloc in allocs {
        writeln!(writer, "{} {} {}", alloc.pc, alloc.size, alloc.accesses.len())?;
        for acc in &alloc.accesses {
            writeln!(writer, "{} {} {}", acc.range, acc.pc, acc.thread)?;
        }
    }
    Ok(())
}

pub fn read_api<BR: BufRead>(mut reader: BR) -> FsResult<Vec<AllocAccesses>> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    parse_api(&contents)
}

pub fn parse_api(input: &str) -> FsResult<Vec<AllocAccesses>> {
    let mut tokens = Tokens::new(input);

    let n_allocs = api_token(&mut tokens, Tokens::next_u64)?;
    let mut allocs = Vec::with_capacity(n_allocs as usize);
    for _ in 0..n_allocs {
        let pc = api_token(&mut tokens, Tokens::next_pc)?;
        let size = api_token(&mut tokens, Tokens::next_u64)?;
        let n_accesses = api_token(&mut tokens, Tokens::next_u64)?;
        let mut accesses = Vec::with_capacity(n_accesses as usize);
        for _ in 0..n_accesses {
            let range = api_token(&mut tokens, Tokens::next_segment)?;
            let pc = api_token(&mut tokens, Tokens::next_pc)?;
            let thread = api_token(&mut tokens, Tokens::next_u32)?;
            accesses.push(ApiAccess { range, pc, thread });
        }
        allocs.push(AllocAccesses { pc, size, accesses });
    }
    Ok(allocs)
}

fn api_token<'a, T>(
    tokens: &mut Tokens<'a>,
    read: impl FnOnce(&mut Tokens<'a>) -> Result<T, TokenError>,
) -> FsResult<T> {
    read(tokens).map_err(|error| FsError::BadApiFile {
        token: tokens.consumed(),
        error,
    })
}

/// Whitespace-separated token reader shared by the stream-style formats
pub(crate) struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
    consumed: usize,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Tokens {
            iter: input.split_whitespace(),
            consumed: 0,
        }
    }

    /// Index of the last token handed out (for error reporting)
    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }

    pub(crate) fn try_next(&mut self) -> Option<&'a str> {
        let tok = self.iter.next();
        if tok.is_some() {
            self.consumed += 1;
        }
        tok
    }

    fn next(&mut self) -> Result<&'a str, TokenError> {
        self.try_next().ok_or(TokenError::UnexpectedEof)
    }

    pub(crate) fn next_u64(&mut self) -> Result<u64, TokenError> {
        self.next()?.parse().map_err(TokenError::BadInt)
    }

    pub(crate) fn next_u32(&mut self) -> Result<u32, TokenError> {
        self.next()?.parse().map_err(TokenError::BadInt)
    }

    pub(crate) fn next_u16(&mut self) -> Result<u16, TokenError> {
        self.next()?.parse().map_err(TokenError::BadInt)
    }

    pub(crate) fn next_pc(&mut self) -> Result<Pc, TokenError> {
        let func = self.next_u16()?;
        let inst = self.next_u16()?;
        Ok(Pc::new(func, inst))
    }

    pub(crate) fn next_segment(&mut self) -> Result<Segment, TokenError> {
        let start = self.next_u64()?;
        let end = self.next_u64()?;
        Ok(Segment::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let allocs = vec![
            AllocAccesses {
                pc: Pc::new(3, 7),
                size: 128,
                accesses: vec![ApiAccess {
                    range: Segment::new(0, 8),
                    pc: Pc::new(1, 2),
                    thread: 0,
                }],
            },
            AllocAccesses {
                pc: Pc::null(),
                size: 64,
                accesses: vec![
                    ApiAccess {
                        range: Segment::new(0, 4),
                        pc: Pc::new(5, 1),
                        thread: 1,
                    },
                    ApiAccess {
                        range: Segment::new(4, 8),
                        pc: Pc::new(5, 1),
                        thread: 2,
                    },
                ],
            },
        ];

        let mut buf = Vec::new();
        write_api(&mut buf, &allocs).unwrap();
        let parsed = read_api(buf.as_slice()).unwrap();
        assert_eq!(parsed, allocs);
    }

    #[test]
    fn truncated_file() {
        assert!(matches!(
            parse_api("1\n3 7 128 1\n0 8 1 2"),
            Err(FsError::BadApiFile {
                error: TokenError::UnexpectedEof,
                ..
            }),
        ));
    }

    #[test]
    fn bad_number() {
        assert!(matches!(
            parse_api("x"),
            Err(FsError::BadApiFile {
                token: 1,
                error: TokenError::BadInt(_),
            }),
        ));
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse_api("0\n").unwrap(), Vec::new());
    }
}
