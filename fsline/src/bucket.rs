//! Cache-line bucketing
//!
//! Groups the accesses of one allocation by the 64-byte cache line they fall
//! in and merges them into disjoint [`AddrRecord`] sub-ranges via a
//! breakpoint sweep.

use crate::segment::Segment;
use crate::threadset::ThreadSet;

use std::collections::{BTreeMap, BTreeSet};

use trace_format::{Pc, Rw};

pub const CACHELINE_BIT: u32 = 6;
pub const CACHELINE_SIZE: u64 = 1 << CACHELINE_BIT;

pub const fn cacheline_of(addr: u64) -> u64 {
    addr >> CACHELINE_BIT
}

pub const fn cacheline_align_up(val: u64) -> u64 {
    let delta = val % CACHELINE_SIZE;
    if delta != 0 {
        val + CACHELINE_SIZE - delta
    } else {
        val
    }
}

/// One access localized to its owning allocation
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalAccess {
    /// Byte range relative to the allocation start
    pub range: Segment,
    pub thread: u16,
    pub pc: Pc,
    pub rw: Rw,
}

/// Merged, de-duplicated record for one contiguous sub-range of a cache line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrRecord {
    /// Allocation-relative byte range
    pub range: Segment,
    pub thread_rw: BTreeMap<u16, Rw>,
    pub pc_rw: BTreeMap<Pc, Rw>,
    pub pc_threads: BTreeSet<(Pc, u16)>,
}

impl AddrRecord {
    fn new(range: Segment) -> Self {
        AddrRecord {
            range,
            thread_rw: BTreeMap::new(),
            pc_rw: BTreeMap::new(),
            pc_threads: BTreeSet::new(),
        }
    }

    fn absorb(&mut self, acc: &LocalAccess) {
        *self.thread_rw.entry(acc.thread).or_default() += acc.rw;
        *self.pc_rw.entry(acc.pc).or_default() += acc.rw;
        self.pc_threads.insert((acc.pc, acc.thread));
    }

    fn is_untouched(&self) -> bool {
        self.thread_rw.is_empty()
    }

    /// The set of threads that ever touched any byte of this range
    pub fn thread_ids(&self) -> ThreadSet {
        self.thread_rw.keys().map(|&t| u32::from(t)).collect()
    }
}

/// Bucket all accesses of one allocation into per-cache-line records.
///
/// `alloc_start` is the allocation's runtime start address (0 when the
/// metadata is unknown); cache line ids are absolute, so neighboring
/// allocations sharing a line keep distinct record sets but the same line id.
pub fn bucket_accesses(
    alloc_start: u64,
    accesses: &[LocalAccess],
) -> BTreeMap<u64, Vec<AddrRecord>> {
    let mut per_line: BTreeMap<u64, Vec<LocalAccess>> = BTreeMap::new();
    for acc in accesses {
        // zero-sized accesses touch no byte
        if acc.range.is_empty() {
            continue;
        }
        let mut start = acc.range.start;
        while start < acc.range.end {
            let line = cacheline_of(alloc_start + start);
            let line_end = ((line + 1) << CACHELINE_BIT) - alloc_start;
            let end = std::cmp::min(acc.range.end, line_end);
            per_line.entry(line).or_default().push(LocalAccess {
                range: Segment::new(start, end),
                ..*acc
            });
            start = end;
        }
    }

    per_line
        .into_iter()
        .map(|(line, accs)| (line, sweep_line(&accs)))
        .filter(|(_, records)| !records.is_empty())
        .collect()
}

/// Breakpoint sweep over the accesses of one cache line.
///
/// Collects the unique start/end offsets, makes one candidate record per
/// consecutive breakpoint pair, and folds every access into the records its
/// range spans. Counts stay unmodified on each sub-range: splitting changes
/// ranges, not counts. Empty intervals are dropped.
fn sweep_line(accesses: &[LocalAccess]) -> Vec<AddrRecord> {
    let breakpoints = accesses
        .iter()
        .flat_map(|acc| [acc.range.start, acc.range.end])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    if breakpoints.len() < 2 {
        return Vec::new();
    }

    let mut slots = breakpoints
        .windows(2)
        .map(|pair| AddrRecord::new(Segment::new(pair[0], pair[1])))
        .collect::<Vec<_>>();
    for acc in accesses {
        let lo = breakpoints
            .binary_search(&acc.range.start)
            .expect("by construction, every range start is a breakpoint");
        let hi = breakpoints
            .binary_search(&acc.range.end)
            .expect("by construction, every range end is a breakpoint");
        for slot in &mut slots[lo..hi] {
            slot.absorb(acc);
        }
    }

    slots.retain(|slot| !slot.is_untouched());
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(start: u64, end: u64, thread: u16, reads: u32, writes: u32) -> LocalAccess {
        LocalAccess {
            range: Segment::new(start, end),
            thread,
            pc: Pc::new(1, thread),
            rw: Rw::new(reads, writes),
        }
    }

    #[test]
    fn sweep_partial_overlap() {
        let accesses = [acc(0, 8, 0, 1, 0), acc(4, 12, 1, 0, 1)];
        let lines = bucket_accesses(0, &accesses);
        assert_eq!(lines.len(), 1);
        let records = &lines[&0];
        assert_eq!(
            records.iter().map(|r| r.range).collect::<Vec<_>>(),
            vec![
                Segment::new(0, 4),
                Segment::new(4, 8),
                Segment::new(8, 12)
            ]
        );
        // middle slot sees both threads, outer slots one each
        assert_eq!(records[0].thread_rw.len(), 1);
        assert_eq!(records[1].thread_rw.len(), 2);
        assert_eq!(records[2].thread_rw.len(), 1);
        assert_eq!(records[1].thread_rw[&0], Rw::new(1, 0));
        assert_eq!(records[1].thread_rw[&1], Rw::new(0, 1));
    }

    #[test]
    fn coverage_is_exact() {
        // the union of output ranges covers each access exactly, no gaps
        let accesses = [acc(0, 8, 0, 1, 0), acc(8, 16, 1, 1, 0), acc(32, 40, 0, 0, 1)];
        let lines = bucket_accesses(0, &accesses);
        let covered = lines[&0]
            .iter()
            .map(|r| r.range)
            .collect::<Vec<_>>();
        assert_eq!(
            Segment::merge_neighbors(&covered),
            vec![Segment::new(0, 16), Segment::new(32, 40)]
        );
    }

    #[test]
    fn straddling_access_is_split() {
        // [60, 68) crosses the line boundary at 64
        let accesses = [acc(60, 68, 2, 3, 4)];
        let lines = bucket_accesses(0, &accesses);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[&0][0].range, Segment::new(60, 64));
        assert_eq!(lines[&1][0].range, Segment::new(64, 68));
        // counts are preserved unmodified on each half
        assert_eq!(lines[&0][0].thread_rw[&2], Rw::new(3, 4));
        assert_eq!(lines[&1][0].thread_rw[&2], Rw::new(3, 4));
    }

    #[test]
    fn alloc_start_anchors_lines() {
        let accesses = [acc(0, 8, 0, 1, 0)];
        let lines = bucket_accesses(0x1000, &accesses);
        assert_eq!(lines.keys().copied().collect::<Vec<_>>(), vec![0x40]);
        // ranges stay allocation-relative
        assert_eq!(lines[&0x40][0].range, Segment::new(0, 8));
    }

    #[test]
    fn empty_inputs() {
        assert!(bucket_accesses(0, &[]).is_empty());
        assert!(bucket_accesses(0, &[acc(4, 4, 0, 1, 0)]).is_empty());
    }

    #[test]
    fn align_up() {
        assert_eq!(cacheline_align_up(0), 0);
        assert_eq!(cacheline_align_up(40), 64);
        assert_eq!(cacheline_align_up(64), 64);
        assert_eq!(cacheline_align_up(65), 128);
    }
}
