//! Layout repair engine
//!
//! Takes the observed `(range, pc, thread)` triples of one allocation and
//! computes a padded relayout where regions with distinct thread affinity
//! never share a cache line, plus the old-to-new offset redirections a code
//! patcher needs.

use crate::analysis::AnalysisHints;
use crate::api::AllocAccesses;
use crate::bucket::cacheline_align_up;
use crate::error::LayoutError;
use crate::segment::Segment;
use crate::threadset::ThreadSet;

use std::collections::{BTreeMap, BTreeSet};

use trace_format::Pc;

/// One redirection for the code patcher: at this pc, the given thread's
/// accesses to `old_offset` move to `new_offset`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemapLine {
    pub thread: u32,
    pub old_offset: u64,
    pub new_offset: u64,
}

/// Padded relayout of one allocation
#[derive(Debug, Clone)]
pub struct Layout {
    access_relation: BTreeMap<(Pc, u32), Vec<Segment>>,
    remappings: BTreeMap<u64, Segment>,
    remapping_lines: BTreeMap<Pc, Vec<RemapLine>>,
    after_mapped: u64,
    elem_size: Option<u64>,
}

impl Layout {
    pub fn compute(
        input: &AllocAccesses,
        target_threads: Option<u32>,
        hints: Option<&AnalysisHints>,
    ) -> Result<Layout, LayoutError> {
        // hints only apply when they know this allocation's element stride
        let hints = hints.filter(|h| h.elem_size_of(input.pc).is_some());
        let mut layout = Layout {
            access_relation: BTreeMap::new(),
            remappings: BTreeMap::new(),
            remapping_lines: BTreeMap::new(),
            after_mapped: 0,
            elem_size: hints.and_then(|h| h.elem_size_of(input.pc)),
        };

        for acc in &input.accesses {
            layout.insert(acc.pc, acc.thread, acc.range, hints);
        }
        layout.normalize();

        if let Some(target) = target_threads {
            if layout.is_linear() {
                log::info!("the segments are linear");
                layout.extrapolate(target, hints)?;
            } else {
                log::info!("the segments are not linear");
            }
        }

        let mut affinity = layout.thread_affinity();
        merge_segments(&mut affinity);

        let mut grouped: BTreeMap<ThreadSet, Vec<Segment>> = BTreeMap::new();
        for (seg, set) in affinity {
            // map iteration is ascending, so each group's list stays sorted
            grouped.entry(set).or_default().push(seg);
        }

        layout.calc_remapping(&grouped);
        layout.remap()?;
        Ok(layout)
    }

    /// Total size of the relaid-out allocation
    pub fn new_size(&self) -> u64 {
        self.after_mapped
    }

    /// Old region start -> new region, covering every observed byte
    pub fn remappings(&self) -> &BTreeMap<u64, Segment> {
        &self.remappings
    }

    /// Per-pc redirections, sorted
    pub fn remapping_lines(&self) -> &BTreeMap<Pc, Vec<RemapLine>> {
        &self.remapping_lines
    }

    fn insert(&mut self, pc: Pc, thread: u32, range: Segment, hints: Option<&AnalysisHints>) {
        // arrays of structs: normalize the offset modulo the element stride,
        // then place the replacement segment inside the right element
        let range = match (self.elem_size, hints.and_then(|h| h.replacement_for(pc))) {
            (Some(elem), Some(replacement)) if elem > 0 => {
                let element = range.start / elem;
                replacement.shift_up(element * elem)
            }
            _ => range,
        };
        self.access_relation
            .entry((pc, thread))
            .or_default()
            .push(range);
    }

    fn normalize(&mut self) {
        for segs in self.access_relation.values_mut() {
            segs.sort();
            *segs = Segment::merge_neighbors(segs);
        }
    }

    /// Main-group pcs (thread 0), thread-group pcs (threads >= 1, deduped)
    /// and the number of distinct observed threads.
    fn groups(&self) -> (Vec<Pc>, Vec<Pc>, u32) {
        let mut main_group = Vec::new();
        let mut thread_group = Vec::new();
        let mut threads = BTreeSet::new();
        for &(pc, thread) in self.access_relation.keys() {
            threads.insert(thread);
            if thread == 0 {
                main_group.push(pc);
            } else if !thread_group.contains(&pc) {
                thread_group.push(pc);
            }
        }
        (main_group, thread_group, threads.len() as u32)
    }

    /// Whether the access pattern is an arithmetic progression: constant
    /// range size and stride along thread 0's per-pc lists, and constant
    /// size/stride across single-segment per-thread lists.
    fn is_linear(&self) -> bool {
        let (main_group, thread_group, num_threads) = self.groups();

        for pc in &main_group {
            let ranges = &self.access_relation[&(*pc, 0)];
            let mut stride = None;
            for pair in ranges.windows(2) {
                if pair[0].len() != pair[1].len() {
                    return false;
                }
                let diff = pair[1].end - pair[0].end;
                match stride {
                    None => stride = Some(diff),
                    Some(s) if s != diff => return false,
                    Some(_) => (),
                }
            }
        }

        for pc in &thread_group {
            let mut stride = None;
            for thread in 1..num_threads.saturating_sub(1) {
                let (Some(r1), Some(r2)) = (
                    self.access_relation.get(&(*pc, thread)),
                    self.access_relation.get(&(*pc, thread + 1)),
                ) else {
                    return false;
                };
                if r1.len() != 1 || r2.len() != 1 {
                    return false;
                }
                if r1[0].len() != r2[0].len() {
                    return false;
                }
                let diff = r2[0].end.wrapping_sub(r1[0].end);
                match stride {
                    None => stride = Some(diff),
                    Some(s) if s != diff => return false,
                    Some(_) => (),
                }
            }
        }

        true
    }

    fn single_segment(&self, pc: Pc, thread: u32) -> Result<Segment, LayoutError> {
        self.access_relation
            .get(&(pc, thread))
            .and_then(|segs| segs.first())
            .copied()
            .ok_or(LayoutError::MissingThreadList { pc, thread })
    }

    /// Continue the detected progression up to `target` total threads,
    /// synthesizing ranges for the thread ids never observed in the trace.
    fn extrapolate(
        &mut self,
        target: u32,
        hints: Option<&AnalysisHints>,
    ) -> Result<(), LayoutError> {
        let (main_group, thread_group, num_threads) = self.groups();
        if target <= num_threads {
            return Ok(());
        }
        let extra = target - num_threads;

        for pc in &main_group {
            let ranges = self
                .access_relation
                .get_mut(&(*pc, 0))
                .expect("main group key came from the relation");
            if ranges.len() < 2 {
                return Err(LayoutError::ShortMainList { pc: *pc });
            }
            let diff = ranges[1].end.wrapping_sub(ranges[0].end);
            let mut last = ranges[ranges.len() - 1];
            for _ in 0..extra {
                last = Segment::new(last.start.wrapping_add(diff), last.end.wrapping_add(diff));
                ranges.push(last);
            }
        }

        for pc in &thread_group {
            let s1 = self.single_segment(*pc, 1)?;
            let s2 = self.single_segment(*pc, 2)?;
            let diff = s2.start.wrapping_sub(s1.start);
            let mut last = self.single_segment(*pc, num_threads - 1)?;
            for k in 0..extra {
                last = Segment::new(last.start.wrapping_add(diff), last.end.wrapping_add(diff));
                self.insert(*pc, num_threads + k, last, hints);
            }
        }

        Ok(())
    }

    fn thread_affinity(&self) -> BTreeMap<Segment, ThreadSet> {
        let mut affinity: BTreeMap<Segment, ThreadSet> = BTreeMap::new();
        for ((_, thread), segs) in &self.access_relation {
            for seg in segs {
                affinity.entry(*seg).or_default().insert(*thread);
            }
        }
        affinity
    }

    /// Lay affinity groups out consecutively; pad the running offset up to
    /// the next cache-line boundary between groups so distinct groups never
    /// share a line.
    fn calc_remapping(&mut self, grouped: &BTreeMap<ThreadSet, Vec<Segment>>) {
        let mut offset = 0;
        for segs in grouped.values() {
            if offset != 0 {
                offset = cacheline_align_up(offset);
            }
            for seg in segs {
                let map_to = Segment::new(offset, offset + seg.len());
                self.remappings.insert(seg.start, map_to);
                offset = map_to.end;
            }
        }
        self.after_mapped = offset;
    }

    /// Translate every observed segment through the offset map.
    ///
    /// When all of a `(pc, thread)` key's segments share one delta a single
    /// redirection suffices; otherwise the patcher needs every translation.
    fn remap(&mut self) -> Result<(), LayoutError> {
        let mut remapping_lines: BTreeMap<Pc, Vec<RemapLine>> = BTreeMap::new();
        for ((pc, thread), segs) in &self.access_relation {
            let mut lines = Vec::with_capacity(segs.len());
            let mut deltas: Vec<i64> = Vec::with_capacity(segs.len());
            for seg in segs {
                let (old_start, map_to) = self
                    .remappings
                    .range(..=seg.start)
                    .next_back()
                    .ok_or(LayoutError::UnmappedSegment(*seg))?;
                if seg.end > old_start + map_to.len() {
                    return Err(LayoutError::UnmappedSegment(*seg));
                }
                let delta = map_to.start as i64 - *old_start as i64;
                deltas.push(delta);
                lines.push(RemapLine {
                    thread: *thread,
                    old_offset: seg.start,
                    new_offset: seg.start.wrapping_add_signed(delta),
                });
            }
            let all_equal = deltas.windows(2).all(|pair| pair[0] == pair[1]);
            let entry = remapping_lines.entry(*pc).or_default();
            if !all_equal {
                entry.extend(lines);
            } else if let Some(first) = lines.first() {
                entry.push(*first);
            }
        }
        for lines in remapping_lines.values_mut() {
            lines.sort();
        }
        self.remapping_lines = remapping_lines;
        Ok(())
    }
}

/// Coalesce a sorted affinity map: overlapping segments are unioned (joining
/// their affinity masks, which may conflate distinct thread groups), then
/// exactly-touching segments with identical affinity are merged.
fn merge_segments(affinity: &mut BTreeMap<Segment, ThreadSet>) {
    let mut overlaps: Vec<(Segment, ThreadSet)> = Vec::new();
    for (seg, set) in std::mem::take(affinity) {
        match overlaps.last_mut() {
            Some(top) if top.0.overlap(&seg) => {
                top.0.end = std::cmp::max(top.0.end, seg.end);
                top.1.union_with(&set);
            }
            _ => overlaps.push((seg, set)),
        }
    }

    let mut touches: Vec<(Segment, ThreadSet)> = Vec::new();
    for (seg, set) in overlaps {
        match touches.last_mut() {
            Some(top) if top.0.touch(&seg) && top.1 == set => top.0.end = seg.end,
            _ => touches.push((seg, set)),
        }
    }

    affinity.extend(touches);
}
