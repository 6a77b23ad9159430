//! Typed cache service over the backing store
//!
//! The service owns no concurrency state of its own: the backing store is
//! the sole point of serialization, and any number of callers may invoke it
//! concurrently. Values are stored as JSON text; a malformed payload is a
//! data-integrity error, never silently ignored.

use crate::cache::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::metrics::MetricsRecorder;
use crate::store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Typed get/set/get-or-set cache with TTL policy and metrics reporting
///
/// The cache is never the system of record: every stored value must be
/// re-derivable from its originating factory, so losing all entries costs
/// latency, never correctness.
pub struct CacheService {
    store: Arc<dyn KeyValueStore>,
    metrics: Arc<MetricsRecorder>,
    config: CacheConfig,
}

impl CacheService {
    /// Create a cache service over a backing store, reporting into the
    /// given recorder
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<MetricsRecorder>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            config,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    /// Fetch and deserialize a value
    ///
    /// Returns `Ok(None)` on a genuine miss. A payload that cannot be
    /// deserialized fails with a serialization error; partially parsed
    /// data is never returned.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let start = Instant::now();

        let raw = match self.store.get(&self.namespaced(key)).await {
            Ok(raw) => raw,
            Err(e) => {
                self.record_error().await;
                return Err(e);
            }
        };
        let elapsed = elapsed_ms(start);

        match raw {
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => {
                    if self.config.enable_metrics {
                        self.metrics.record_hit(elapsed).await;
                    }
                    debug!("Cache hit: {}", key);
                    Ok(Some(value))
                }
                Err(e) => {
                    self.record_error().await;
                    warn!("Malformed cache payload for {}: {}", key, e);
                    Err(CacheError::Serialization(format!(
                        "malformed payload for {}: {}",
                        key, e
                    )))
                }
            },
            None => {
                if self.config.enable_metrics {
                    self.metrics.record_miss(elapsed).await;
                }
                debug!("Cache miss: {}", key);
                Ok(None)
            }
        }
    }

    /// Serialize and store a value
    ///
    /// With `ttl` of `None` the default TTL applies; an explicit zero TTL
    /// stores the value without expiry. The entry is fully replaced, never
    /// mutated in place.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| CacheError::Serialization(format!("encode failed for {}: {}", key, e)))?;

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let namespaced = self.namespaced(key);
        let start = Instant::now();

        let result = if ttl.as_secs() > 0 {
            let effective = self.config.ttl_with_jitter(ttl);
            self.store
                .set_with_expiry(&namespaced, &text, effective.as_secs())
                .await
        } else {
            self.store.set(&namespaced, &text).await
        };

        match result {
            Ok(()) => {
                if self.config.enable_metrics {
                    self.metrics.record_write(elapsed_ms(start)).await;
                }
                debug!("Cached {} (ttl: {:?})", key, ttl);
                Ok(())
            }
            Err(e) => {
                self.record_error().await;
                Err(e)
            }
        }
    }

    /// Return the cached value if present, otherwise invoke the factory,
    /// store its result, and return it
    ///
    /// The factory runs at most once per call. There is no cross-caller
    /// deduplication: two concurrent misses for the same key both invoke
    /// the factory, an accepted trade-off favoring simplicity over a
    /// distributed lock. Callers needing single-flight semantics must layer
    /// their own, or use [`CacheService::acquire_lock`].
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, factory: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }

        let value = factory().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    /// Delete a single key; deleting an absent key is not an error
    pub async fn delete(&self, key: &str) -> Result<()> {
        let removed = self.store.delete(&[self.namespaced(key)]).await?;
        if self.config.enable_metrics && removed > 0 {
            self.metrics.record_evictions(removed).await;
        }
        debug!("Deleted cache key: {} (existed: {})", key, removed > 0);
        Ok(())
    }

    /// Delete every key matching a glob pattern, returning the count
    ///
    /// Matching keys are resolved first, then removed in one bulk delete.
    /// Zero matches is a no-op, not an error.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let keys = self.store.keys_matching(&self.namespaced(pattern)).await?;
        if keys.is_empty() {
            debug!("No keys match pattern: {}", pattern);
            return Ok(0);
        }

        let removed = self.store.delete(&keys).await?;
        if self.config.enable_metrics {
            self.metrics.record_evictions(removed).await;
        }
        debug!("Deleted {} keys matching pattern: {}", removed, pattern);
        Ok(removed)
    }

    /// Wait until a sentinel key disappears, polling every
    /// `lock_poll_interval`
    ///
    /// Best-effort only: this is a cooperative convention layered on key
    /// presence, not a mutual-exclusion primitive. For real cross-process
    /// exclusion use [`CacheService::acquire_lock`]. Exceeding `max_wait`
    /// fails with a timeout error the caller must handle.
    pub async fn wait_for_lock(&self, key: &str, max_wait: Duration) -> Result<()> {
        let namespaced = self.namespaced(key);
        let start = Instant::now();

        loop {
            if self.store.get(&namespaced).await?.is_none() {
                return Ok(());
            }

            if start.elapsed() >= max_wait {
                return Err(CacheError::Timeout {
                    key: key.to_string(),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }

            tokio::time::sleep(self.config.lock_poll_interval).await;
        }
    }

    /// Try to take a store-side lock via atomic set-if-absent
    ///
    /// Returns an owner token on success, `None` if the lock is held. The
    /// TTL bounds how long a crashed holder can wedge the lock.
    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_if_absent(&self.namespaced(key), &token, ttl.as_secs().max(1))
            .await?;
        Ok(acquired.then_some(token))
    }

    /// Release a lock taken with [`CacheService::acquire_lock`]
    ///
    /// Only the holder of the matching token releases; returns whether the
    /// lock was released.
    pub async fn release_lock(&self, key: &str, token: &str) -> Result<bool> {
        let namespaced = self.namespaced(key);
        match self.store.get(&namespaced).await? {
            Some(current) if current == token => {
                self.store.delete(&[namespaced]).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_error(&self) {
        if self.config.enable_metrics {
            self.metrics.record_error().await;
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
