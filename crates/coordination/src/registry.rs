//! Bounded In-Process Operation Registry
//!
//! Degraded idempotency store used when no shared cache is reachable. Only
//! protects against duplicates within this process.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct LocalRecord {
    claimed_at: Instant,
    ttl: Duration,
    generation: u64,
}

/// Operation keys claimed by this process, oldest evicted first
#[derive(Debug)]
pub(crate) struct LocalOperationRegistry {
    records: HashMap<String, LocalRecord>,
    /// Claim order; stale generations are skipped on eviction
    order: VecDeque<(String, u64)>,
    capacity: usize,
    next_generation: u64,
}

impl LocalOperationRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            next_generation: 0,
        }
    }

    /// Claim `key` for `ttl`. Returns `false` if a live claim already exists.
    pub(crate) fn try_claim(&mut self, key: &str, ttl: Duration, now: Instant) -> bool {
        if let Some(record) = self.records.get(key) {
            if now.duration_since(record.claimed_at) < record.ttl {
                return false;
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.records.insert(
            key.to_string(),
            LocalRecord {
                claimed_at: now,
                ttl,
                generation,
            },
        );
        self.order.push_back((key.to_string(), generation));
        self.evict();
        true
    }

    /// Drop a claim so the key may be claimed again immediately
    pub(crate) fn release(&mut self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    fn evict(&mut self) {
        while self.records.len() > self.capacity {
            let Some((key, generation)) = self.order.pop_front() else {
                break;
            };
            if self
                .records
                .get(&key)
                .is_some_and(|r| r.generation == generation)
            {
                self.records.remove(&key);
                debug!("Evicted local operation record {}", key);
            }
        }

        // Re-claims leave stale order entries behind
        if self.order.len() > self.capacity * 2 {
            let records = &self.records;
            self.order
                .retain(|(key, generation)| records.get(key).is_some_and(|r| r.generation == *generation));
        }
    }
}

/// Windowed counters kept by this process when the shared cache is unusable
#[derive(Debug, Default)]
pub(crate) struct LocalCounters {
    counters: HashMap<String, (u64, Instant)>,
}

impl LocalCounters {
    /// Add one to `key`, opening a new window of `window` if none is live
    pub(crate) fn increment(&mut self, key: &str, window: Duration, now: Instant) -> u64 {
        self.counters.retain(|_, (_, expires_at)| now < *expires_at);
        let (count, _) = self
            .counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        *count += 1;
        *count
    }

    pub(crate) fn value(&self, key: &str, now: Instant) -> u64 {
        self.counters
            .get(key)
            .filter(|(_, expires_at)| now < *expires_at)
            .map_or(0, |(count, _)| *count)
    }
}
