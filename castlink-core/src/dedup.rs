//! Message Deduplication
//!
//! Bounded, insertion-ordered set of message ids with strict FIFO eviction.

use std::collections::{HashSet, VecDeque};

/// Bounded set of recently seen message ids.
///
/// Insertion order is preserved for eviction: when the set grows past its
/// capacity, the oldest surviving id is evicted. Re-adding a present id is
/// a no-op and does not refresh its position.
#[derive(Debug)]
pub struct DedupSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupSet {
    /// Creates a dedup set retaining at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        DedupSet {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns true if the id has been seen and not yet evicted.
    pub fn has(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records an id, evicting the oldest surviving id when over capacity.
    pub fn add(&mut self, id: &str) {
        if self.ids.contains(id) {
            return;
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    /// Removes all ids.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    /// Returns the number of retained ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no ids are retained.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
