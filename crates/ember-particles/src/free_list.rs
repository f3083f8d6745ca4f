//! Bitset-backed slot allocator for a group's particle storage

const BITS: usize = u64::BITS as usize;

/// Tracks which slot indices in `[0, len)` are unused.
///
/// `alloc` always hands out the lowest unused index. The lowest unused index
/// is cached, so allocation only scans forward from the previous hint.
/// Invariant: `count() == len() - (number of unused bits)`.
#[derive(Debug, Default, Clone)]
pub struct FreeList {
    is_unused: Vec<u64>,
    len: usize,
    first_unused: Option<usize>,
    allocated: usize,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots tracked
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow the tracked range to `new_len` slots, all new slots unused.
    ///
    /// Shrinking is not supported.
    pub fn resize(&mut self, new_len: usize) {
        debug_assert!(new_len >= self.len, "free list cannot shrink");
        if new_len <= self.len {
            return;
        }
        let old_len = self.len;
        self.is_unused.resize(new_len.div_ceil(BITS), 0);
        for i in old_len..new_len {
            self.set_unused(i, true);
        }
        self.len = new_len;
        self.first_unused = Some(self.first_unused.map_or(old_len, |f| f.min(old_len)));
    }

    /// Take the lowest unused slot, or `None` when every slot is in use
    pub fn alloc(&mut self) -> Option<usize> {
        let idx = self.first_unused?;
        self.set_unused(idx, false);
        self.allocated += 1;
        self.first_unused = self.next_unused_from(idx + 1);
        Some(idx)
    }

    /// Return a slot. Freeing a slot that is already unused does nothing.
    pub fn free(&mut self, index: usize) {
        debug_assert!(index < self.len, "free of out-of-range slot {index}");
        if index >= self.len || self.is_unused(index) {
            return;
        }
        self.set_unused(index, true);
        self.allocated -= 1;
        self.first_unused = Some(self.first_unused.map_or(index, |f| f.min(index)));
    }

    /// Number of slots currently in use
    pub fn count(&self) -> usize {
        self.allocated
    }

    pub fn has_unused_entries(&self) -> bool {
        self.first_unused.is_some()
    }

    pub fn is_unused(&self, index: usize) -> bool {
        self.is_unused[index / BITS] & (1 << (index % BITS)) != 0
    }

    fn set_unused(&mut self, index: usize, unused: bool) {
        let word = &mut self.is_unused[index / BITS];
        let mask = 1u64 << (index % BITS);
        if unused {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    fn next_unused_from(&self, start: usize) -> Option<usize> {
        if start >= self.len {
            return None;
        }
        let mut word_idx = start / BITS;
        // Mask off bits below `start` in the first word
        let mut word = self.is_unused[word_idx] & (!0u64 << (start % BITS));
        loop {
            if word != 0 {
                let idx = word_idx * BITS + word.trailing_zeros() as usize;
                return (idx < self.len).then_some(idx);
            }
            word_idx += 1;
            if word_idx >= self.is_unused.len() {
                return None;
            }
            word = self.is_unused[word_idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unused_bits(list: &FreeList) -> usize {
        list.is_unused.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[test]
    fn empty_list_has_nothing_to_alloc() {
        let mut list = FreeList::new();
        assert!(!list.has_unused_entries());
        assert_eq!(list.alloc(), None);
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn alloc_returns_lowest_free() {
        let mut list = FreeList::new();
        list.resize(4);
        assert_eq!(list.alloc(), Some(0));
        assert_eq!(list.alloc(), Some(1));
        assert_eq!(list.alloc(), Some(2));
        list.free(1);
        assert_eq!(list.alloc(), Some(1));
        assert_eq!(list.alloc(), Some(3));
        assert_eq!(list.alloc(), None);
        assert_eq!(list.count(), 4);
    }

    #[test]
    fn resize_extends_unused_range() {
        let mut list = FreeList::new();
        list.resize(2);
        list.alloc();
        list.alloc();
        assert!(!list.has_unused_entries());
        list.resize(5);
        assert!(list.has_unused_entries());
        assert_eq!(list.alloc(), Some(2));
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn double_free_is_ignored() {
        let mut list = FreeList::new();
        list.resize(3);
        list.alloc();
        list.alloc();
        list.free(0);
        list.free(0);
        assert_eq!(list.count(), 1);
        assert_eq!(list.count(), list.len() - unused_bits(&list));
    }

    #[test]
    fn scan_crosses_word_boundaries() {
        let mut list = FreeList::new();
        list.resize(200);
        for _ in 0..130 {
            list.alloc();
        }
        assert_eq!(list.alloc(), Some(130));
        list.free(70);
        list.free(129);
        assert_eq!(list.alloc(), Some(70));
        assert_eq!(list.alloc(), Some(129));
        assert_eq!(list.alloc(), Some(131));
    }

    #[test]
    fn count_matches_unused_bits() {
        let mut list = FreeList::new();
        list.resize(100);
        let mut held = Vec::new();
        for i in 0..100 {
            if let Some(idx) = list.alloc() {
                held.push(idx);
            }
            if i % 3 == 0 {
                if let Some(idx) = held.pop() {
                    list.free(idx);
                }
            }
            assert_eq!(list.count(), list.len() - unused_bits(&list));
            assert_eq!(list.count(), held.len());
        }
        list.resize(150);
        assert_eq!(list.count(), list.len() - unused_bits(&list));
    }
}
