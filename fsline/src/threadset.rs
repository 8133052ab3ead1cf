/// Growable bit-vector of thread ids, used as the thread-affinity key.
///
/// The total order equals the numeric order of the bitmask, so folding maps
/// keyed by [`ThreadSet`] visits affinity groups in a canonical order.
///
/// Invariant: the last word is non-zero (the empty set is the empty vector),
/// so structural equality coincides with set equality.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct ThreadSet {
    words: Vec<u64>,
}

const WORD_BITS: u32 = u64::BITS;

impl ThreadSet {
    pub fn new() -> Self {
        ThreadSet::default()
    }

    pub fn single(thread: u32) -> Self {
        let mut set = ThreadSet::new();
        set.insert(thread);
        set
    }

    pub fn insert(&mut self, thread: u32) {
        let word = (thread / WORD_BITS) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (thread % WORD_BITS);
    }

    pub fn contains(&self, thread: u32) -> bool {
        let word = (thread / WORD_BITS) as usize;
        self.words
            .get(word)
            .is_some_and(|w| w & (1 << (thread % WORD_BITS)) != 0)
    }

    pub fn union_with(&mut self, other: &ThreadSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (word, rhs) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= rhs;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.words.len() as u32 * WORD_BITS).filter(move |&t| self.contains(t))
    }
}

impl FromIterator<u32> for ThreadSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = ThreadSet::new();
        for thread in iter {
            set.insert(thread);
        }
        set
    }
}

impl Ord for ThreadSet {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // numeric order: wider masks are larger, then compare from the most
        // significant word down
        self.words
            .len()
            .cmp(&other.words.len())
            .then_with(|| self.words.iter().rev().cmp(other.words.iter().rev()))
    }
}

impl PartialOrd for ThreadSet {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains() {
        let set: ThreadSet = [0, 3, 64, 130].into_iter().collect();
        assert!(set.contains(0));
        assert!(set.contains(3));
        assert!(set.contains(64));
        assert!(set.contains(130));
        assert!(!set.contains(2));
        assert!(!set.contains(129));
        assert_eq!(set.len(), 4);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 3, 64, 130]);
    }

    #[test]
    fn equality_is_set_equality() {
        let a: ThreadSet = [1, 2].into_iter().collect();
        let b: ThreadSet = [2, 1].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, ThreadSet::single(1));
    }

    #[test]
    fn numeric_order() {
        let one = ThreadSet::single(0);
        let two = ThreadSet::single(1);
        let high = ThreadSet::single(70);
        let both: ThreadSet = [0, 1].into_iter().collect();
        assert!(one < two);
        assert!(two < both);
        assert!(both < high);
    }

    #[test]
    fn union() {
        let mut a: ThreadSet = [0, 5].into_iter().collect();
        let b: ThreadSet = [5, 65].into_iter().collect();
        a.union_with(&b);
        assert_eq!(a, [0, 5, 65].into_iter().collect());
    }
}
