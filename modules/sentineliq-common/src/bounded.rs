use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Insertion-ordered set with a hard capacity.
///
/// When full, the oldest half is evicted in one pass, so membership checks
/// stay O(1) and eviction cost is amortized.
#[derive(Debug)]
pub struct BoundedSet<T> {
    capacity: usize,
    order: VecDeque<T>,
    members: HashSet<T>,
}

impl<T> BoundedSet<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }

    /// Returns false if the value was already present.
    pub fn insert(&mut self, value: T) -> bool {
        if self.members.contains(&value) {
            return false;
        }
        if self.order.len() >= self.capacity {
            self.evict_oldest_half();
        }
        self.members.insert(value.clone());
        self.order.push_back(value);
        true
    }

    pub fn remove(&mut self, value: &T) -> bool {
        if !self.members.remove(value) {
            return false;
        }
        self.order.retain(|v| v != value);
        true
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) {
        for value in values {
            self.insert(value);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_oldest_half(&mut self) {
        let drop = self.order.len() / 2;
        for value in self.order.drain(..drop) {
            self.members.remove(&value);
        }
    }
}
