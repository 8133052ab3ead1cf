//! False-sharing cost model
//!
//! For one cache line, partitions the bucketed records into thread-affinity
//! groups and folds pairwise interference estimates into a single score.

use crate::bucket::AddrRecord;
use crate::threadset::ThreadSet;

use std::collections::BTreeMap;

use trace_format::Rw;

/// Per-cache-line false-sharing estimate
#[derive(Debug, Clone)]
pub struct Graph {
    pub cacheline: u64,
    pub records: Vec<AddrRecord>,
    score: u64,
}

#[derive(Debug, Default, Copy, Clone)]
struct RwTotal {
    reads: u64,
    writes: u64,
}

impl RwTotal {
    fn add(&mut self, rw: &Rw) {
        self.reads += u64::from(rw.reads);
        self.writes += u64::from(rw.writes);
    }
}

impl Graph {
    pub fn new(cacheline: u64, mut records: Vec<AddrRecord>) -> Self {
        records.sort_by_key(|rec| rec.range);
        let score = estimate_false_sharing(&records);
        Graph {
            cacheline,
            records,
            score,
        }
    }

    pub fn score(&self) -> u64 {
        self.score
    }
}

/// Partition records by the exact set of threads touching them.
///
/// The groups come back in ascending [`ThreadSet`] order so that the score
/// fold below is deterministic.
fn affinity_groups(records: &[AddrRecord]) -> Vec<(ThreadSet, Vec<&AddrRecord>)> {
    let mut map: BTreeMap<ThreadSet, Vec<&AddrRecord>> = BTreeMap::new();
    for rec in records {
        map.entry(rec.thread_ids()).or_default().push(rec);
    }
    map.into_iter().collect()
}

fn total_rw(records: &[&AddrRecord]) -> RwTotal {
    let mut total = RwTotal::default();
    for rec in records {
        for rw in rec.thread_rw.values() {
            total.add(rw);
        }
    }
    total
}

fn total_rw_excluding(records: &[&AddrRecord], exclude: &ThreadSet) -> RwTotal {
    let mut total = RwTotal::default();
    for rec in records {
        for (&thread, rw) in &rec.thread_rw {
            if !exclude.contains(u32::from(thread)) {
                total.add(rw);
            }
        }
    }
    total
}

/// How much `rhs` suffers from `lhs`'s writes.
///
/// A write by `lhs` only costs `rhs` a coherence miss if `rhs`'s threads
/// (minus any overlap with `lhs`) touch the line afterward, so the estimate
/// is capped by the smaller side.
fn suffered_from(lhs: &(ThreadSet, Vec<&AddrRecord>), rhs: &(ThreadSet, Vec<&AddrRecord>)) -> u64 {
    let lhs_rw = total_rw(&lhs.1);
    let rhs_minus_lhs = total_rw_excluding(&rhs.1, &lhs.0);
    std::cmp::min(lhs_rw.writes, rhs_minus_lhs.reads + rhs_minus_lhs.writes)
}

/// Sum, over every group, of the worst interference with any later group.
///
/// This is deliberately not a full pairwise double-sum: each group
/// contributes only its single worst pairing with a later-indexed partner.
/// Downstream ranking and thresholds are calibrated to this exact rule.
fn estimate_false_sharing(records: &[AddrRecord]) -> u64 {
    let groups = affinity_groups(records);
    let mut total = 0;
    for (i, lhs) in groups.iter().enumerate() {
        let max_rw = groups[(i + 1)..]
            .iter()
            .map(|rhs| std::cmp::max(suffered_from(lhs, rhs), suffered_from(rhs, lhs)))
            .max()
            .unwrap_or(0);
        total += max_rw;
    }
    total
}
