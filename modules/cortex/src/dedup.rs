use std::collections::HashSet;

use sentineliq_common::BoundedSet;

/// Result of looking a content hash up before storing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashClaim {
    /// Not seen before; the caller now holds it until `commit` or `release`.
    Fresh,
    /// Already stored.
    Seen,
    /// Another article with this content is being stored right now.
    InFlight,
}

/// Recently stored content hashes plus the ones currently being written.
/// Membership is O(1); the oldest half of the stored set is evicted when full.
#[derive(Debug)]
pub struct ContentDeduper {
    seen: BoundedSet<String>,
    in_flight: HashSet<String>,
    hits: u64,
}

impl ContentDeduper {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: BoundedSet::new(capacity),
            in_flight: HashSet::new(),
            hits: 0,
        }
    }

    /// Seed with hashes already stored, oldest first.
    pub fn warm<I: IntoIterator<Item = String>>(&mut self, hashes: I) {
        self.seen.extend(hashes);
    }

    pub fn claim(&mut self, hash: &str) -> HashClaim {
        if self.seen.contains(&hash.to_string()) {
            self.hits += 1;
            return HashClaim::Seen;
        }
        if !self.in_flight.insert(hash.to_string()) {
            return HashClaim::InFlight;
        }
        HashClaim::Fresh
    }

    /// The content for a claimed hash is stored.
    pub fn commit(&mut self, hash: &str) {
        self.in_flight.remove(hash);
        self.seen.insert(hash.to_string());
    }

    /// The content for a claimed hash never made it to the store.
    pub fn release(&mut self, hash: &str) {
        self.in_flight.remove(hash);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}
