/// Half-open byte range `[start, end)`
///
/// Invariant: `start <= end`. A degenerate segment (`start == end`) contains
/// no point and overlaps nothing.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
}

impl Segment {
    pub const fn new(start: u64, end: u64) -> Self {
        Segment { start, end }
    }

    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the two ranges intersect with positive measure
    pub const fn overlap(&self, rhs: &Segment) -> bool {
        self.start < rhs.end && self.end > rhs.start
    }

    /// Whether `rhs` starts exactly where `self` ends
    pub const fn touch(&self, rhs: &Segment) -> bool {
        self.end == rhs.start
    }

    pub const fn contains(&self, val: u64) -> bool {
        self.start <= val && val < self.end
    }

    pub const fn shift_up(&self, by: u64) -> Segment {
        Segment {
            start: self.start + by,
            end: self.end + by,
        }
    }

    pub const fn shift_down(&self, by: u64) -> Segment {
        Segment {
            start: self.start - by,
            end: self.end - by,
        }
    }

    /// Coalesce exactly-touching neighbors in a sorted segment list
    pub fn merge_neighbors(segs: &[Segment]) -> Vec<Segment> {
        let mut ret = Vec::with_capacity(segs.len());
        let mut iter = segs.iter();
        let Some(first) = iter.next() else {
            return ret;
        };

        let mut last = *first;
        for seg in iter {
            if last.touch(seg) {
                last.end = seg.end;
            } else {
                ret.push(last);
                last = *seg;
            }
        }
        ret.push(last);
        ret
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{} {}", self.start, self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (Segment::new(0, 8), Segment::new(4, 12)),
            (Segment::new(0, 8), Segment::new(8, 16)),
            (Segment::new(0, 8), Segment::new(16, 24)),
            (Segment::new(0, 16), Segment::new(4, 8)),
            (Segment::new(4, 4), Segment::new(0, 8)),
        ];
        for (a, b) in cases {
            assert_eq!(a.overlap(&b), b.overlap(&a), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn degenerate_segment() {
        let empty = Segment::new(4, 4);
        assert!(!empty.contains(4));
        assert!(!empty.overlap(&Segment::new(0, 8)));
        assert!(!empty.overlap(&empty));
        // a zero-length segment still "touches" a range starting at its point
        assert!(empty.touch(&Segment::new(4, 8)));
    }

    #[test]
    fn merge_spanning() {
        // sorted, pairwise touching: collapses to the full span
        let segs = [
            Segment::new(0, 8),
            Segment::new(8, 16),
            Segment::new(16, 40),
        ];
        assert_eq!(Segment::merge_neighbors(&segs), vec![Segment::new(0, 40)]);
    }

    #[test]
    fn merge_idempotent() {
        let segs = [
            Segment::new(0, 8),
            Segment::new(8, 16),
            Segment::new(20, 24),
            Segment::new(32, 40),
            Segment::new(40, 48),
        ];
        let once = Segment::merge_neighbors(&segs);
        let twice = Segment::merge_neighbors(&once);
        assert_eq!(
            once,
            vec![
                Segment::new(0, 16),
                Segment::new(20, 24),
                Segment::new(32, 48)
            ]
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_empty() {
        assert_eq!(Segment::merge_neighbors(&[]), Vec::new());
    }

    #[test]
    fn ordering() {
        assert!(Segment::new(0, 8) < Segment::new(0, 16));
        assert!(Segment::new(0, 16) < Segment::new(4, 8));
    }
}
