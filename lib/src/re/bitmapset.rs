use std::hash::Hash;

use bitvec::vec::BitVec;
use rustc_hash::FxHashSet;

/// A set of (`usize`, T) pairs, used by the Pike VM for keeping track of
/// the (instruction pointer, counters) pairs visited during a step.
///
/// As in any set, the pairs are guaranteed to be unique, the `insert`
/// operation is a no-op if the pair already exists in the set.
///
/// Keys are instruction pointers, which are small and dense, so the set
/// keeps a bitmap with one bit per key. When the bit for a key is not set
/// the pair is known to be new without looking it up in the hash set. In
/// programs without counted repetitions every value is the same, so the
/// bitmap alone decides. The bitmap grows as needed.
#[derive(Debug, Default)]
pub(crate) struct BitmapSet<T>
where
    T: Default + Copy + PartialEq + Eq + Hash,
{
    // Pairs in insertion order, used for clearing the bitmap.
    items: Vec<(usize, T)>,
    // Set that contains the (key,value) pairs.
    set: FxHashSet<(usize, T)>,
    // One bit per key, set if some pair with that key is in the set.
    bitmap: BitVec<usize>,
}

impl<T> BitmapSet<T>
where
    T: Default + Copy + PartialEq + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            set: FxHashSet::default(),
            bitmap: BitVec::repeat(false, 1024),
        }
    }

    /// Adds a (key,value) pair to the set.
    ///
    /// Returns `true` if the (key,value) pair didn't exist in the set and
    /// was added, and `false` if the pair already existed.
    #[inline]
    pub fn insert(&mut self, key: usize, value: T) -> bool {
        if self.bitmap.len() <= key {
            self.bitmap.resize(key + 1, false);
        }

        let new = if self.bitmap[key] {
            self.set.insert((key, value))
        } else {
            self.bitmap.set(key, true);
            self.set.insert((key, value));
            true
        };

        if new {
            self.items.push((key, value));
        }

        new
    }

    /// Removes all values in the set.
    #[inline]
    pub fn clear(&mut self) {
        for (key, _) in self.items.drain(0..) {
            self.bitmap.set(key, false);
        }
        self.set.clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::BitmapSet;

    #[test]
    fn thread_set() {
        let mut s = BitmapSet::<[u32; 2]>::new();

        assert!(s.insert(4, [0, 0]));
        assert!(s.insert(2, [0, 0]));
        assert!(s.insert(2000, [0, 0]));
        assert!(s.insert(4, [1, 0]));

        assert!(!s.insert(4, [0, 0]));
        assert!(!s.insert(2, [0, 0]));
        assert!(!s.insert(2000, [0, 0]));
        assert!(!s.insert(4, [1, 0]));

        assert_eq!(
            s.items,
            vec![(4, [0, 0]), (2, [0, 0]), (2000, [0, 0]), (4, [1, 0])]
        );

        s.clear();

        assert!(s.items.is_empty());
        assert_eq!(s.bitmap.count_ones(), 0);

        assert!(s.insert(2000, [0, 0]));
        assert!(s.insert(3, [0, 7]));

        assert_eq!(
            s.items,
            vec![(2000, [0, 0]), (3, [0, 7])]
        );
    }
}
