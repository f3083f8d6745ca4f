//! Expiry heap: particles ordered by rounded death time
//!
//! Each node holds every particle expiring in the same millisecond, so bursts
//! emitted in one frame share a node instead of bloating the heap.

use crate::datum::ParticleDatum;
use ember_core::rounded_millis;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct HeapNode {
    time: i64,
    slots: HashSet<usize>,
}

/// Array-backed binary min-heap keyed by expiry time in milliseconds.
///
/// Values are slot indices in the owning group's storage. Capacity grows in
/// powers of two; `lookups` maps each key to its node position and is kept in
/// step with every swap.
#[derive(Debug, Clone)]
pub struct DataHeap {
    nodes: Vec<HeapNode>,
    /// Capacity is `1 << size_exp`
    size_exp: u32,
    end: usize,
    lookups: HashMap<i64, usize>,
}

impl Default for DataHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl DataHeap {
    pub fn new() -> Self {
        let mut heap = Self {
            nodes: Vec::with_capacity(1000),
            size_exp: 0,
            end: 0,
            lookups: HashMap::new(),
        };
        heap.clear();
        heap
    }

    /// Queue a particle at `round(1000 * (t + life_span))`
    pub fn insert(&mut self, datum: &ParticleDatum) {
        self.insert_timed(datum.index, rounded_millis(datum.t + datum.life_span));
    }

    /// Queue a slot at an explicit key, joining an existing node with that key
    pub fn insert_timed(&mut self, slot: usize, time: i64) {
        if let Some(&pos) = self.lookups.get(&time) {
            self.nodes[pos].slots.insert(slot);
            return;
        }
        if self.end == self.capacity() {
            self.grow();
        }
        let node = &mut self.nodes[self.end];
        node.time = time;
        node.slots.clear();
        node.slots.insert(slot);
        self.lookups.insert(time, self.end);
        self.end += 1;
        self.bubble_up(self.end - 1);
    }

    /// Smallest key, `None` when empty
    pub fn top(&self) -> Option<i64> {
        (self.end > 0).then(|| self.nodes[0].time)
    }

    /// Remove the node with the smallest key and return its slots
    pub fn pop(&mut self) -> Option<HashSet<usize>> {
        if self.end == 0 {
            return None;
        }
        self.lookups.remove(&self.nodes[0].time);
        self.end -= 1;
        let ret = if self.end == 0 {
            std::mem::take(&mut self.nodes[0].slots)
        } else {
            self.nodes.swap(0, self.end);
            self.lookups.insert(self.nodes[0].time, 0);
            let ret = std::mem::take(&mut self.nodes[self.end].slots);
            self.bubble_down(0);
            ret
        };
        Some(ret)
    }

    /// Drop every node and shrink back to a single allocated node
    pub fn clear(&mut self) {
        self.size_exp = 0;
        self.end = 0;
        self.nodes.clear();
        self.nodes.resize_with(1, HeapNode::default);
        self.lookups.clear();
    }

    /// Linear search for a slot in any node
    pub fn contains(&self, slot: usize) -> bool {
        self.nodes[..self.end].iter().any(|n| n.slots.contains(&slot))
    }

    /// Number of distinct keys queued
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn capacity(&self) -> usize {
        1 << self.size_exp
    }

    fn grow(&mut self) {
        self.size_exp += 1;
        self.nodes.resize_with(self.capacity(), HeapNode::default);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.nodes.swap(a, b);
        self.lookups.insert(self.nodes[a].time, a);
        self.lookups.insert(self.nodes[b].time, b);
    }

    fn bubble_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.nodes[idx].time >= self.nodes[parent].time {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn bubble_down(&mut self, mut idx: usize) {
        loop {
            let left = idx * 2 + 1;
            if left >= self.end {
                return;
            }
            let right = left + 1;
            let mut lesser = left;
            if right < self.end && self.nodes[left].time > self.nodes[right].time {
                lesser = right;
            }
            if self.nodes[idx].time <= self.nodes[lesser].time {
                return;
            }
            self.swap(idx, lesser);
            idx = lesser;
        }
    }
}
