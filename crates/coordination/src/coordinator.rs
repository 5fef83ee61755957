//! Stateless Coordinator Implementation

use crate::cache::{CacheError, SharedCache};
use crate::registry::{LocalCounters, LocalOperationRegistry};
use crate::validation::{validate_stateless_operation, StatelessValidation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound for a single shared-cache call (default: 250ms)
    pub cache_timeout: Duration,
    /// Maximum records kept by the local fallback registry
    pub local_capacity: usize,
    /// Heartbeat record lifetime (default: 120s)
    pub heartbeat_ttl: Duration,
    /// Heartbeat refresh cadence (default: 60s)
    pub heartbeat_interval: Duration,
    /// Version reported in heartbeats
    pub version: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_timeout: Duration::from_millis(250),
            local_capacity: 10_000,
            heartbeat_ttl: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(60),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Which store backed an idempotency decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyScope {
    /// Decision holds across every instance sharing the cache
    Shared,
    /// Decision only holds within this process
    LocalOnly,
}

/// Result of claiming an operation key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyOutcome {
    /// Whether the caller may execute the operation
    pub may_proceed: bool,
    /// Strength of the guarantee behind `may_proceed`
    pub scope: IdempotencyScope,
}

/// Shared-cache record marking an operation as executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub owner_instance_id: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

/// Liveness record for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHeartbeat {
    pub instance_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Generate an identifier unique to this process start.
///
/// Used for attribution and debugging only, never as a correctness key.
pub fn generate_instance_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "instance".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}-{}",
        host,
        std::process::id(),
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

fn operation_cache_key(key: &str) -> String {
    format!("operation:{}", key)
}

fn counter_cache_key(key: &str) -> String {
    format!("counter:{}", key)
}

fn heartbeat_cache_key(instance_id: &str) -> String {
    format!("instance:{}:heartbeat", instance_id)
}

/// Per-process coordination state.
///
/// Constructed once at startup and shared by `Arc` with every caller.
pub struct StatelessCoordinator {
    instance_id: String,
    cache: Option<Arc<dyn SharedCache>>,
    local: Mutex<LocalOperationRegistry>,
    local_counters: Mutex<LocalCounters>,
    config: CoordinatorConfig,
    started_at: Instant,
}

impl StatelessCoordinator {
    /// Create a coordinator with a freshly generated instance id
    pub fn new(cache: Option<Arc<dyn SharedCache>>, config: CoordinatorConfig) -> Self {
        Self::with_instance_id(generate_instance_id(), cache, config)
    }

    /// Create a coordinator with an explicit instance id
    pub fn with_instance_id(
        instance_id: impl Into<String>,
        cache: Option<Arc<dyn SharedCache>>,
        config: CoordinatorConfig,
    ) -> Self {
        let instance_id = instance_id.into();
        if cache.is_some() {
            info!("Coordinator {} using shared cache", instance_id);
        } else {
            warn!(
                "Coordinator {} has no shared cache; idempotency is process-local only",
                instance_id
            );
        }
        Self {
            local: Mutex::new(LocalOperationRegistry::new(config.local_capacity)),
            local_counters: Mutex::new(LocalCounters::default()),
            instance_id,
            cache,
            config,
            started_at: Instant::now(),
        }
    }

    /// This process's instance id
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Whether a shared cache is configured
    pub fn has_shared_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Time since this coordinator was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Claim `key` for `ttl`.
    ///
    /// The first claim within the TTL may proceed; later claims may not. Cache
    /// failures fall back to the local registry, reported through `scope`.
    pub async fn ensure_idempotent_operation(&self, key: &str, ttl: Duration) -> IdempotencyOutcome {
        if let Some(cache) = &self.cache {
            match self.claim_shared(cache.as_ref(), key, ttl).await {
                Ok(may_proceed) => {
                    if !may_proceed {
                        debug!("Operation {} already executed", key);
                    }
                    return IdempotencyOutcome {
                        may_proceed,
                        scope: IdempotencyScope::Shared,
                    };
                }
                Err(e) => {
                    warn!(
                        "Shared cache claim failed for {}: {}; falling back to local registry",
                        key, e
                    );
                    metrics::counter!("idempotency_fallback_total").increment(1);
                }
            }
        }

        let may_proceed = self
            .local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_claim(key, ttl, Instant::now());
        IdempotencyOutcome {
            may_proceed,
            scope: IdempotencyScope::LocalOnly,
        }
    }

    async fn claim_shared(
        &self,
        cache: &dyn SharedCache,
        key: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let record = OperationRecord {
            owner_instance_id: self.instance_id.clone(),
            created_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
        };
        let payload =
            serde_json::to_string(&record).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.bounded(cache.set_if_absent(&operation_cache_key(key), payload, Some(ttl)))
            .await
    }

    /// Give up a claim taken by [`Self::ensure_idempotent_operation`].
    ///
    /// Used when the claimed operation did not take effect, so a retry may
    /// proceed before the TTL runs out. Returns whether a claim was removed.
    pub async fn release_operation(&self, key: &str) -> bool {
        let released_local = self
            .local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(key);
        let Some(cache) = &self.cache else {
            return released_local;
        };
        match self.bounded(cache.delete(&operation_cache_key(key))).await {
            Ok(released) => released || released_local,
            Err(e) => {
                warn!("Failed to release operation {}: {}", key, e);
                released_local
            }
        }
    }

    /// Add one to a counter that resets `window` after its first increment.
    ///
    /// Counts are shared across instances; cache failures fall back to a
    /// process-local counter.
    pub async fn increment_counter(&self, key: &str, window: Duration) -> u64 {
        if let Some(cache) = &self.cache {
            match self
                .bounded(cache.increment(&counter_cache_key(key), Some(window)))
                .await
            {
                Ok(count) => return count,
                Err(e) => {
                    warn!("Shared counter {} unavailable: {}; counting locally", key, e);
                    metrics::counter!("idempotency_fallback_total").increment(1);
                }
            }
        }
        self.local_counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .increment(key, window, Instant::now())
    }

    /// Current value of a counter, zero when absent or expired
    pub async fn counter_value(&self, key: &str) -> u64 {
        if let Some(cache) = &self.cache {
            match self.bounded(cache.get(&counter_cache_key(key))).await {
                Ok(Some(raw)) => match raw.parse() {
                    Ok(count) => return count,
                    Err(e) => warn!("Counter {} is corrupt: {}", key, e),
                },
                Ok(None) => return 0,
                Err(e) => warn!("Shared counter {} unavailable: {}", key, e),
            }
        }
        self.local_counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value(key, Instant::now())
    }

    /// Store instance-scoped scratch data. Returns `false` without a cache.
    pub async fn store_temporary_data(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                warn!("Temporary data {} not serializable: {}", key, e);
                return false;
            }
        };
        match self
            .bounded(cache.set(&self.temp_key(key), payload, Some(ttl)))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to store temporary data {}: {}", key, e);
                false
            }
        }
    }

    /// Read instance-scoped scratch data
    pub async fn get_temporary_data(&self, key: &str) -> Option<serde_json::Value> {
        let cache = self.cache.as_ref()?;
        match self.bounded(cache.get(&self.temp_key(key))).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Temporary data {} is corrupt: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read temporary data {}: {}", key, e);
                None
            }
        }
    }

    /// Delete instance-scoped scratch data
    pub async fn delete_temporary_data(&self, key: &str) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        match self.bounded(cache.delete(&self.temp_key(key))).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete temporary data {}: {}", key, e);
                false
            }
        }
    }

    /// Upsert this instance's heartbeat record
    pub async fn update_instance_heartbeat(&self) -> bool {
        let Some(cache) = &self.cache else {
            debug!("No shared cache, heartbeat skipped");
            return false;
        };
        let heartbeat = InstanceHeartbeat {
            instance_id: self.instance_id.clone(),
            timestamp: Utc::now(),
            version: self.config.version.clone(),
        };
        let payload = match serde_json::to_string(&heartbeat) {
            Ok(p) => p,
            Err(e) => {
                warn!("Heartbeat not serializable: {}", e);
                return false;
            }
        };
        match self
            .bounded(cache.set(
                &heartbeat_cache_key(&self.instance_id),
                payload,
                Some(self.config.heartbeat_ttl),
            ))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Heartbeat update failed: {}", e);
                false
            }
        }
    }

    /// Read the heartbeat of any instance
    pub async fn instance_heartbeat(&self, instance_id: &str) -> Option<InstanceHeartbeat> {
        let cache = self.cache.as_ref()?;
        let raw = self
            .bounded(cache.get(&heartbeat_cache_key(instance_id)))
            .await
            .ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Refresh the heartbeat on the configured cadence until aborted
    pub fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.heartbeat_interval);
            loop {
                ticker.tick().await;
                if coordinator.update_instance_heartbeat().await {
                    debug!("Heartbeat refreshed for {}", coordinator.instance_id);
                }
            }
        })
    }

    /// Advisory check for operations that look like they depend on local state
    pub fn validate_stateless_operation(
        &self,
        name: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> StatelessValidation {
        validate_stateless_operation(name, params)
    }

    fn temp_key(&self, key: &str) -> String {
        format!("temp:{}:{}", self.instance_id, key)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.config.cache_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.config.cache_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;

    struct FailingCache;

    #[async_trait]
    impl SharedCache for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set_if_absent(
            &self,
            _: &str,
            _: String,
            _: Option<Duration>,
        ) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn increment(&self, _: &str, _: Option<Duration>) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    struct HangingCache;

    #[async_trait]
    impl SharedCache for HangingCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            std::future::pending().await
        }
        async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<bool, CacheError> {
            std::future::pending().await
        }
        async fn set_if_absent(
            &self,
            _: &str,
            _: String,
            _: Option<Duration>,
        ) -> Result<bool, CacheError> {
            std::future::pending().await
        }
        async fn increment(&self, _: &str, _: Option<Duration>) -> Result<u64, CacheError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str) -> Result<bool, CacheError> {
            std::future::pending().await
        }
    }

    fn shared(cache: &Arc<MemoryCache>, id: &str) -> StatelessCoordinator {
        let cache: Arc<dyn SharedCache> = cache.clone();
        StatelessCoordinator::with_instance_id(id, Some(cache), CoordinatorConfig::default())
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = generate_instance_id();
        let b = generate_instance_id();
        assert_ne!(a, b);
        assert!(a.contains(&std::process::id().to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotency_with_shared_cache() {
        let cache = Arc::new(MemoryCache::new());
        let coordinator = shared(&cache, "a");
        let ttl = Duration::from_secs(60);

        let first = coordinator.ensure_idempotent_operation("batch-1", ttl).await;
        assert!(first.may_proceed);
        assert_eq!(first.scope, IdempotencyScope::Shared);
        assert!(!coordinator.ensure_idempotent_operation("batch-1", ttl).await.may_proceed);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(coordinator.ensure_idempotent_operation("batch-1", ttl).await.may_proceed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotency_local_fallback() {
        let coordinator =
            StatelessCoordinator::with_instance_id("solo", None, CoordinatorConfig::default());
        let ttl = Duration::from_secs(60);

        let first = coordinator.ensure_idempotent_operation("k", ttl).await;
        assert!(first.may_proceed);
        assert_eq!(first.scope, IdempotencyScope::LocalOnly);
        assert!(!coordinator.ensure_idempotent_operation("k", ttl).await.may_proceed);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(coordinator.ensure_idempotent_operation("k", ttl).await.may_proceed);
    }

    #[tokio::test]
    async fn test_two_instances_race_on_shared_cache() {
        let cache = Arc::new(MemoryCache::new());
        let a = Arc::new(shared(&cache, "a"));
        let b = Arc::new(shared(&cache, "b"));
        let ttl = Duration::from_secs(60);

        let (ra, rb) = tokio::join!(
            tokio::spawn({
                let a = Arc::clone(&a);
                async move { a.ensure_idempotent_operation("K", ttl).await }
            }),
            tokio::spawn({
                let b = Arc::clone(&b);
                async move { b.ensure_idempotent_operation("K", ttl).await }
            }),
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert!(ra.may_proceed ^ rb.may_proceed);
        assert_eq!(ra.scope, IdempotencyScope::Shared);
        assert_eq!(rb.scope, IdempotencyScope::Shared);

        let raw = cache.get("operation:K").await.unwrap().unwrap();
        let record: OperationRecord = serde_json::from_str(&raw).unwrap();
        let winner = if ra.may_proceed { "a" } else { "b" };
        assert_eq!(record.owner_instance_id, winner);
        assert_eq!(record.ttl_seconds, 60);
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_local() {
        let cache: Arc<dyn SharedCache> = Arc::new(FailingCache);
        let coordinator =
            StatelessCoordinator::with_instance_id("x", Some(cache), CoordinatorConfig::default());
        let ttl = Duration::from_secs(60);

        let first = coordinator.ensure_idempotent_operation("k", ttl).await;
        assert!(first.may_proceed);
        assert_eq!(first.scope, IdempotencyScope::LocalOnly);
        assert!(!coordinator.ensure_idempotent_operation("k", ttl).await.may_proceed);

        assert!(!coordinator.store_temporary_data("t", &serde_json::json!(1), ttl).await);
        assert_eq!(coordinator.get_temporary_data("t").await, None);
        assert!(!coordinator.update_instance_heartbeat().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_cache_times_out() {
        let cache: Arc<dyn SharedCache> = Arc::new(HangingCache);
        let coordinator =
            StatelessCoordinator::with_instance_id("x", Some(cache), CoordinatorConfig::default());

        let outcome = coordinator
            .ensure_idempotent_operation("k", Duration::from_secs(60))
            .await;
        assert!(outcome.may_proceed);
        assert_eq!(outcome.scope, IdempotencyScope::LocalOnly);
    }

    #[tokio::test]
    async fn test_released_operation_may_run_again() {
        let cache = Arc::new(MemoryCache::new());
        let a = shared(&cache, "a");
        let b = shared(&cache, "b");
        let ttl = Duration::from_secs(600);

        assert!(a.ensure_idempotent_operation("publish", ttl).await.may_proceed);
        assert!(!b.ensure_idempotent_operation("publish", ttl).await.may_proceed);
        assert!(a.release_operation("publish").await);
        assert!(b.ensure_idempotent_operation("publish", ttl).await.may_proceed);

        let solo = StatelessCoordinator::with_instance_id("solo", None, CoordinatorConfig::default());
        assert!(solo.ensure_idempotent_operation("k", ttl).await.may_proceed);
        assert!(solo.release_operation("k").await);
        assert!(solo.ensure_idempotent_operation("k", ttl).await.may_proceed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counters_are_shared_and_windowed() {
        let cache = Arc::new(MemoryCache::new());
        let a = shared(&cache, "a");
        let b = shared(&cache, "b");
        let window = Duration::from_secs(3600);

        assert_eq!(a.increment_counter("sent", window).await, 1);
        assert_eq!(b.increment_counter("sent", window).await, 2);
        assert_eq!(a.counter_value("sent").await, 2);

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(b.counter_value("sent").await, 0);
    }

    #[tokio::test]
    async fn test_counters_fall_back_to_local() {
        let cache: Arc<dyn SharedCache> = Arc::new(FailingCache);
        let coordinator =
            StatelessCoordinator::with_instance_id("x", Some(cache), CoordinatorConfig::default());
        let window = Duration::from_secs(60);

        assert_eq!(coordinator.increment_counter("sent", window).await, 1);
        assert_eq!(coordinator.increment_counter("sent", window).await, 2);
        assert_eq!(coordinator.counter_value("sent").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_temporary_data_round_trip() {
        let cache = Arc::new(MemoryCache::new());
        let coordinator = shared(&cache, "a");
        let value = serde_json::json!({"cursor": 42, "items": ["x", "y"]});

        assert!(
            coordinator
                .store_temporary_data("scan", &value, Duration::from_secs(30))
                .await
        );
        assert_eq!(coordinator.get_temporary_data("scan").await, Some(value));

        // Namespaced by instance
        let other = shared(&cache, "b");
        assert_eq!(other.get_temporary_data("scan").await, None);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(coordinator.get_temporary_data("scan").await, None);
    }

    #[tokio::test]
    async fn test_temporary_data_without_cache_is_noop() {
        let coordinator =
            StatelessCoordinator::with_instance_id("solo", None, CoordinatorConfig::default());
        assert!(
            !coordinator
                .store_temporary_data("k", &serde_json::json!("v"), Duration::from_secs(5))
                .await
        );
        assert_eq!(coordinator.get_temporary_data("k").await, None);
        assert!(!coordinator.delete_temporary_data("k").await);
    }

    #[tokio::test]
    async fn test_delete_temporary_data() {
        let cache = Arc::new(MemoryCache::new());
        let coordinator = shared(&cache, "a");
        coordinator
            .store_temporary_data("k", &serde_json::json!(true), Duration::from_secs(5))
            .await;
        assert!(coordinator.delete_temporary_data("k").await);
        assert_eq!(coordinator.get_temporary_data("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_expires_after_ttl() {
        let cache = Arc::new(MemoryCache::new());
        let coordinator = shared(&cache, "node-1");

        assert!(coordinator.update_instance_heartbeat().await);
        let beat = coordinator.instance_heartbeat("node-1").await.unwrap();
        assert_eq!(beat.instance_id, "node-1");
        assert_eq!(beat.version, env!("CARGO_PKG_VERSION"));

        // A single missed 60s beat keeps the record alive
        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(coordinator.instance_heartbeat("node-1").await.is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(coordinator.instance_heartbeat("node-1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_heartbeat_refreshes() {
        let cache = Arc::new(MemoryCache::new());
        let coordinator = Arc::new(shared(&cache, "node-2"));
        let handle = coordinator.spawn_heartbeat();

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(coordinator.instance_heartbeat("node-2").await.is_some());
        }
        handle.abort();
    }
}
