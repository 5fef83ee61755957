//! Shared Cache Contract and In-Process Implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Shared cache errors
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key/value cache reachable by every instance of the service.
///
/// Values are opaque strings; callers encode their own records. A `ttl` of
/// `None` stores the value without expiry.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Read a live value
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Unconditionally write a value
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<bool, CacheError>;

    /// Write a value only if no live value exists under `key`.
    ///
    /// Returns `true` when this call created the entry. Implementations must
    /// make the check and the write a single atomic step.
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Atomically add one to a numeric value, returning the new count.
    ///
    /// A missing key starts at zero and takes `ttl`; an existing key keeps
    /// its expiry.
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, CacheError>;

    /// Remove a value, returning whether one was present
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Entry count that always triggers a sweep on write
const SWEEP_FLOOR: usize = 1024;

/// Default time between write-triggered sweeps
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Size at which the next write sweeps regardless of time
    sweep_at: usize,
    last_sweep: Instant,
}

impl Entries {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: SWEEP_FLOOR,
            last_sweep: Instant::now(),
        }
    }

    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.map.get(key).filter(|e| e.is_live(now))
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, e| e.is_live(now));
        self.sweep_at = (self.map.len() * 2).max(SWEEP_FLOOR);
        self.last_sweep = now;
        before - self.map.len()
    }

    fn insert(&mut self, key: &str, entry: Entry, now: Instant, interval: Duration) {
        if self.map.len() >= self.sweep_at || now.duration_since(self.last_sweep) >= interval {
            let purged = self.sweep(now);
            if purged > 0 {
                debug!("Purged {} expired cache entries", purged);
            }
        }
        self.map.insert(key.to_string(), entry);
    }
}

/// In-process shared cache.
///
/// Shared between coordinators by cloning an `Arc`; useful for single-node
/// deployments and tests. Expiry follows the tokio clock. Expired entries are
/// swept on write, once per sweep interval or when the map doubles.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<Entries>,
    sweep_interval: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache sweeping expired entries at most every `interval`
    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries::new()),
            sweep_interval: interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().map.values().filter(|e| e.is_live(now)).count()
    }

    /// Whether the cache holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries now
    pub fn purge_expired(&self) -> usize {
        self.lock().sweep(Instant::now())
    }

    fn write(&self, entries: &mut Entries, key: &str, value: String, ttl: Option<Duration>, now: Instant) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|t| now + t),
        };
        entries.insert(key, entry, now, self.sweep_interval);
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self.lock().live(key, now).map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        self.write(&mut entries, key, value, ttl, now);
        Ok(true)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        if entries.live(key, now).is_some() {
            return Ok(false);
        }
        self.write(&mut entries, key, value, ttl, now);
        Ok(true)
    }

    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let (current, expires_at) = match entries.live(key, now) {
            Some(entry) => (
                entry
                    .value
                    .parse::<u64>()
                    .map_err(|e| CacheError::Serialization(format!("{}: {}", key, e)))?,
                entry.expires_at,
            ),
            None => (0, ttl.map(|t| now + t)),
        };
        let next = current + 1;
        let entry = Entry {
            value: next.to_string(),
            expires_at,
        };
        entries.insert(key, entry, now, self.sweep_interval);
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self.lock().map.remove(key).is_some_and(|e| e.is_live(now)))
    }
}
