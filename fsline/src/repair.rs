//! Repair pass
//!
//! Runs the layout engine over every allocation from the detect bridge and
//! renders the combined result: resized allocation sites with dense byte
//! translation tables, then per-pc offset redirections.

use crate::analysis::AnalysisHints;
use crate::api::AllocAccesses;
use crate::error::FsError;
use crate::layout::{Layout, RemapLine};

use std::collections::BTreeMap;
use std::io::Write;

use trace_format::Pc;

/// A resized allocation site with a byte-granular translation table
#[derive(Debug, Clone)]
pub struct FixedAlloc {
    pub pc: Pc,
    pub orig_size: u64,
    pub new_size: u64,
    /// `translations[i]` is where byte `i` of the old allocation lands.
    /// Bytes the trace never observed stay at 0.
    pub translations: Vec<u64>,
}

impl FixedAlloc {
    fn new(pc: Pc, orig_size: u64, layout: &Layout) -> Self {
        let mut translations = vec![0; orig_size as usize];
        for (old_start, map_to) in layout.remappings() {
            for i in 0..map_to.len() {
                // extrapolated segments can reach past the traced size
                let Some(slot) = translations.get_mut((old_start + i) as usize) else {
                    break;
                };
                *slot = map_to.start + i;
            }
        }
        FixedAlloc {
            pc,
            orig_size,
            new_size: layout.new_size(),
            translations,
        }
    }
}

/// Combined repair output for every allocation
#[derive(Debug, Default, Clone)]
pub struct RepairOutput {
    /// Allocation sites whose size changed, in input order
    pub fixed: Vec<FixedAlloc>,
    /// Redirections grouped by accessing pc, sorted within each group
    pub lines: BTreeMap<Pc, Vec<RemapLine>>,
}

/// Relayout every allocation. An allocation whose layout cannot be computed
/// is skipped with a warning; the rest of the run is unaffected.
pub fn repair(
    input: &[AllocAccesses],
    target_threads: Option<u32>,
    hints: Option<&AnalysisHints>,
) -> RepairOutput {
    let hints = hints.filter(|h| !h.is_empty());
    let mut output = RepairOutput::default();
    for alloc in input {
        if alloc.accesses.is_empty() {
            log::warn!("allocation at pc {} has no accesses, skipping", alloc.pc);
            continue;
        }
        let layout = match Layout::compute(alloc, target_threads, hints) {
            Ok(layout) => layout,
            Err(error) => {
                log::warn!(
                    "skipping allocation: {}",
                    FsError::Layout {
                        alloc_pc: alloc.pc,
                        error,
                    }
                );
                continue;
            }
        };
        for (pc, lines) in layout.remapping_lines() {
            output.lines.entry(*pc).or_default().extend(lines);
        }
        if layout.new_size() != alloc.size {
            output.fixed.push(FixedAlloc::new(alloc.pc, alloc.size, &layout));
        }
    }
    for lines in output.lines.values_mut() {
        lines.sort();
    }
    output
}

pub fn write_repair<W: Write>(writer: &mut W, output: &RepairOutput) -> std::io::Result<()> {
    writeln!(writer, "{}", output.fixed.len())?;
    for fixed in &output.fixed {
        if fixed.pc.is_null() {
            writeln!(writer, "-1 -1 0 {} 0", fixed.new_size)?;
        } else {
            writeln!(
                writer,
                "{} {} {} {}",
                fixed.pc,
                fixed.orig_size,
                fixed.new_size,
                fixed.translations.len()
            )?;
            for translation in &fixed.translations {
                write!(writer, "{} ", translation)?;
            }
            writeln!(writer)?;
        }
    }
    for (pc, lines) in &output.lines {
        writeln!(writer, "{} {}", pc, lines.len())?;
        for line in lines {
            writeln!(
                writer,
                "{} {} {}",
                line.thread, line.old_offset, line.new_offset
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiAccess;
    use crate::segment::Segment;

    fn acc(start: u64, end: u64, pc: Pc, thread: u32) -> ApiAccess {
        ApiAccess {
            range: Segment::new(start, end),
            pc,
            thread,
        }
    }

    fn two_group_alloc() -> AllocAccesses {
        // thread 0 owns [0, 40), thread 1 owns [40, 60): repair pads the
        // second group onto its own cache line and grows the allocation
        AllocAccesses {
            pc: Pc::new(9, 9),
            size: 64,
            accesses: vec![
                acc(0, 40, Pc::new(1, 1), 0),
                acc(40, 60, Pc::new(2, 2), 1),
            ],
        }
    }

    #[test]
    fn resized_allocation_gets_translation_table() {
        let output = repair(&[two_group_alloc()], None, None);
        assert_eq!(output.fixed.len(), 1);
        let fixed = &output.fixed[0];
        assert_eq!(fixed.pc, Pc::new(9, 9));
        assert_eq!(fixed.orig_size, 64);
        assert_eq!(fixed.new_size, 84);
        assert_eq!(fixed.translations.len(), 64);
        assert_eq!(fixed.translations[0], 0);
        assert_eq!(fixed.translations[39], 39);
        assert_eq!(fixed.translations[40], 64);
        assert_eq!(fixed.translations[59], 83);
        // bytes 60..64 were never observed
        assert_eq!(fixed.translations[63], 0);
    }

    #[test]
    fn unchanged_size_is_not_reported() {
        // single thread, single group: layout is the identity over [0, 64)
        let alloc = AllocAccesses {
            pc: Pc::new(9, 9),
            size: 64,
            accesses: vec![acc(0, 64, Pc::new(1, 1), 0)],
        };
        let output = repair(&[alloc], None, None);
        assert!(output.fixed.is_empty());
        // the identity redirection is still emitted for the patcher
        assert_eq!(
            output.lines[&Pc::new(1, 1)],
            vec![RemapLine {
                thread: 0,
                old_offset: 0,
                new_offset: 0,
            }]
        );
    }

    #[test]
    fn failed_allocation_is_skipped() {
        // vacuously linear single range cannot extrapolate; the healthy
        // allocation after it still goes through
        let broken = AllocAccesses {
            pc: Pc::new(7, 7),
            size: 64,
            accesses: vec![acc(0, 8, Pc::new(1, 1), 0)],
        };
        // four observed threads already meet the target, so no extrapolation
        let healthy = AllocAccesses {
            pc: Pc::new(9, 9),
            size: 200,
            accesses: vec![
                acc(0, 4, Pc::new(1, 1), 0),
                acc(8, 12, Pc::new(1, 1), 0),
                acc(100, 104, Pc::new(2, 2), 1),
                acc(108, 112, Pc::new(2, 2), 2),
                acc(116, 120, Pc::new(2, 2), 3),
            ],
        };
        let output = repair(&[broken, healthy], Some(4), None);
        assert_eq!(output.fixed.len(), 1);
        assert_eq!(output.fixed[0].pc, Pc::new(9, 9));
    }

    #[test]
    fn lines_merged_across_allocations() {
        // the same pc touches two allocations; its redirections concatenate
        let a = AllocAccesses {
            pc: Pc::new(9, 9),
            size: 16,
            accesses: vec![acc(0, 8, Pc::new(1, 1), 0), acc(8, 16, Pc::new(2, 2), 1)],
        };
        let b = AllocAccesses {
            pc: Pc::new(8, 8),
            size: 16,
            accesses: vec![acc(0, 8, Pc::new(1, 1), 0), acc(8, 16, Pc::new(3, 3), 1)],
        };
        let output = repair(&[a, b], None, None);
        assert_eq!(output.lines[&Pc::new(1, 1)].len(), 2);
    }

    #[test]
    fn output_format() {
        let output = repair(&[two_group_alloc()], None, None);
        let mut buf = Vec::new();
        write_repair(&mut buf, &output).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("1"));
        assert_eq!(lines.next(), Some("9 9 64 84 64"));
        let table = lines.next().unwrap();
        assert_eq!(table.split_whitespace().count(), 64);
        assert_eq!(lines.next(), Some("1 1 1"));
        assert_eq!(lines.next(), Some("0 0 0"));
        assert_eq!(lines.next(), Some("2 2 1"));
        assert_eq!(lines.next(), Some("1 40 64"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn null_pc_malloc_line() {
        let alloc = AllocAccesses {
            pc: Pc::null(),
            size: 64,
            accesses: vec![
                acc(0, 40, Pc::new(1, 1), 0),
                acc(40, 60, Pc::new(2, 2), 1),
            ],
        };
        let output = repair(&[alloc], None, None);
        let mut buf = Vec::new();
        write_repair(&mut buf, &output).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(1), Some("-1 -1 0 84 0"));
    }
}
