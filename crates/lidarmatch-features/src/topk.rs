use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::matcher::MatchRecord;

// Heap entry whose ordering puts the worst-ranked record on top.
#[derive(Debug, Clone, Copy)]
struct Ranked(MatchRecord);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `Less` when `a` ranks before `b`: higher relation first, then smaller
/// `idx1`, then smaller `idx2`.
pub(crate) fn rank_cmp(a: &MatchRecord, b: &MatchRecord) -> Ordering {
    b.relation
        .total_cmp(&a.relation)
        .then(a.idx1.cmp(&b.idx1))
        .then(a.idx2.cmp(&b.idx2))
}

/// Keeps the best `capacity` records seen so far.
#[derive(Debug, Clone)]
pub(crate) struct TopK {
    capacity: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopK {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, record: MatchRecord) {
        if self.capacity == 0 {
            return;
        }
        let candidate = Ranked(record);
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
        } else if self.heap.peek().is_some_and(|worst| candidate < *worst) {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    pub(crate) fn merge(mut self, other: TopK) -> Self {
        for Ranked(record) in other.heap {
            self.push(record);
        }
        self
    }

    /// Records best first.
    pub(crate) fn into_sorted_vec(self) -> Vec<MatchRecord> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Ranked(record)| record)
            .collect()
    }
}
