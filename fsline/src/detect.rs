//! Detect pass
//!
//! Groups trace records by owning allocation, buckets them by cache line,
//! scores every line with the cost model and aggregates a per-allocation
//! false-sharing total.

use crate::api::{AllocAccesses, ApiAccess};
use crate::bucket::{bucket_accesses, AddrRecord, LocalAccess};
use crate::error::{FsError, FsResult};
use crate::graph::Graph;
use crate::segment::Segment;

use std::collections::BTreeMap;
use std::io::Write;

use rayon::prelude::*;

use trace_format::{AccessRecord, AllocRecord, Pc};

/// Cache lines scoring below this are dropped from the printed report
/// (their score still counts toward the allocation total)
pub const DEFAULT_THRESHOLD: u64 = 100;

/// Detect-side result for one allocation
#[derive(Debug, Clone)]
pub struct AllocStorage {
    pub id: i64,
    pub info: AllocRecord,
    /// All bucketed records, ascending by range
    records: Vec<AddrRecord>,
    /// Cache-line graphs at/above the threshold, ascending by line id
    graphs: Vec<Graph>,
    total_score: u64,
}

impl AllocStorage {
    /// `info` is `None` for allocations the metadata file never mentions;
    /// their accesses keep absolute offsets and are not bounds-checked.
    /// A declared size-0 allocation yields no buckets.
    pub fn build(
        id: i64,
        info: Option<AllocRecord>,
        accesses: &[AccessRecord],
        threshold: u64,
    ) -> FsResult<Self> {
        let known = info.is_some();
        let info = info.unwrap_or(AllocRecord {
            id,
            start: 0,
            size: 0,
            pc: Pc::null(),
        });
        if known && info.size == 0 {
            return Ok(AllocStorage {
                id,
                info,
                records: Vec::new(),
                graphs: Vec::new(),
                total_score: 0,
            });
        }

        let mut local = Vec::with_capacity(accesses.len());
        for acc in accesses {
            let out_of_bounds = |range| FsError::AccessOutOfBounds {
                alloc_id: id,
                range,
                size: info.size,
            };
            let start = acc
                .addr
                .checked_sub(info.start)
                .ok_or_else(|| out_of_bounds(Segment::new(acc.addr, acc.addr)))?;
            let range = Segment::new(start, start + u64::from(acc.size));
            if known && range.end > info.size {
                return Err(out_of_bounds(range));
            }
            local.push(LocalAccess {
                range,
                thread: acc.thread,
                pc: acc.pc,
                rw: acc.rw,
            });
        }

        let lines = bucket_accesses(info.start, &local);
        let records = lines
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<AddrRecord>>();
        find_overlap(id, &records);

        let graphs = lines
            .into_iter()
            .map(|(line, recs)| Graph::new(line, recs))
            .collect::<Vec<_>>();
        let total_score = graphs.iter().map(Graph::score).sum();
        let graphs = graphs
            .into_iter()
            .filter(|g| g.score() >= threshold)
            .collect();

        Ok(AllocStorage {
            id,
            info,
            records,
            graphs,
            total_score,
        })
    }

    /// Whether any cache line survived the reporting threshold
    pub fn is_reportable(&self) -> bool {
        !self.graphs.is_empty()
    }

    pub fn total_score(&self) -> u64 {
        self.total_score
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    pub fn write_summary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(
            writer,
            "================={}({})================",
            self.id, self.total_score
        )?;
        for graph in &self.graphs {
            writeln!(writer, "{},{}", graph.cacheline, graph.score())?;
        }
        Ok(())
    }

    pub fn api_output(&self) -> AllocAccesses {
        let accesses = self
            .records
            .iter()
            .flat_map(|rec| {
                rec.pc_threads.iter().map(|&(pc, thread)| ApiAccess {
                    range: rec.range,
                    pc,
                    thread: u32::from(thread),
                })
            })
            .collect();
        AllocAccesses {
            pc: self.info.pc,
            size: self.info.size,
            accesses,
        }
    }
}

/// Diagnostic-only: bucketed records are disjoint by construction, so an
/// overlap here signals an instrumentation or engine bug. Never aborts.
fn find_overlap(id: i64, records: &[AddrRecord]) {
    for pair in records.windows(2) {
        if pair[0].range.overlap(&pair[1].range) {
            log::warn!(
                "offset range ({}, {}) overlaps with ({}, {}) in allocation {}",
                pair[0].range.start,
                pair[0].range.end,
                pair[1].range.start,
                pair[1].range.end,
                id
            );
        }
    }
}

/// Full detect pass over a parsed trace
#[derive(Debug)]
pub struct DetectPass {
    /// Reportable allocations, ascending by id
    storages: Vec<AllocStorage>,
}

impl DetectPass {
    /// Allocations are independent, so they are scored in parallel; results
    /// come back keyed by id and are merged in order, identical to a
    /// sequential run.
    pub fn compute(trace: &[AccessRecord], allocs: &[AllocRecord], threshold: u64) -> Self {
        let alloc_map = allocs
            .iter()
            .map(|alloc| (alloc.id, *alloc))
            .collect::<BTreeMap<_, _>>();

        let mut bins: BTreeMap<i64, Vec<AccessRecord>> = BTreeMap::new();
        for (i, rec) in trace.iter().enumerate() {
            if i % 10_000 == 0 {
                log::info!("trace records grouped: {}/{}", i, trace.len());
            }
            bins.entry(rec.alloc_id).or_default().push(*rec);
        }
        log::info!("processing {} allocations", bins.len());

        let bins = bins.into_iter().collect::<Vec<_>>();
        let storages = bins
            .par_iter()
            .map(|(id, accesses)| {
                AllocStorage::build(*id, alloc_map.get(id).copied(), accesses, threshold)
            })
            .collect::<Vec<_>>();

        let storages = storages
            .into_iter()
            .filter_map(|res| match res {
                Ok(storage) if storage.is_reportable() => Some(storage),
                Ok(_) => None,
                Err(err) => {
                    log::warn!("skipping allocation: {}", err);
                    None
                }
            })
            .collect();
        DetectPass { storages }
    }

    pub fn storages(&self) -> &[AllocStorage] {
        &self.storages
    }

    pub fn write_summary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for storage in &self.storages {
            storage.write_summary(writer)?;
        }
        Ok(())
    }

    /// The per-allocation access lists that feed the repair pass
    pub fn api_output(&self) -> Vec<AllocAccesses> {
        self.storages.iter().map(AllocStorage::api_output).collect()
    }
}
