//! Priority-based cache warming
//!
//! The scheduler holds a registry of warmable entries and periodically
//! refreshes them before they expire, so hot keys stay populated. Each
//! cycle visits entries oldest-warmed first (never-warmed entries lead,
//! higher priority breaking ties), processes them in bounded-concurrency
//! batches, and retries failed factories a fixed number of times before
//! reporting a permanent failure. Failed entries stay registered and are
//! retried on the next cycle.
//!
//! Cycles are strictly sequential at the scheduler level: a new cycle never
//! starts while one is in flight, and the next cycle is scheduled after
//! `max(0, interval - elapsed)`.

use crate::cache::service::CacheService;
use crate::error::{CacheError, Result};
use crate::metrics::MetricsRecorder;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

/// Boxed asynchronous producer invoked to refresh an entry
pub type WarmingFactory =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>> + Send + Sync>;

/// Configuration for the warming scheduler
#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// Interval between warming cycles
    pub interval: Duration,
    /// Maximum number of factories in flight at once
    pub max_concurrent: usize,
    /// Retries after a failed factory call (total attempts = 1 + retry_count)
    pub retry_count: u32,
    /// Delay between attempts for the same entry
    pub retry_delay: Duration,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_concurrent: 5,
            retry_count: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl WarmingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(CacheError::Config(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(CacheError::Config(
                "interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A registered warmable entry
#[derive(Clone)]
pub struct WarmingEntry {
    pub key: String,
    pub ttl: Duration,
    pub priority: u8,
    /// When the entry last refreshed successfully; `None` until first warm
    pub last_warmed: Option<DateTime<Utc>>,
    factory: WarmingFactory,
}

impl fmt::Debug for WarmingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmingEntry")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("priority", &self.priority)
            .field("last_warmed", &self.last_warmed)
            .finish_non_exhaustive()
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Serialize)]
pub struct WarmingStats {
    pub total_entries: usize,
    /// Entries that have refreshed successfully at least once
    pub active_entries: usize,
    pub entries_by_priority: HashMap<u8, usize>,
    pub is_warming: bool,
    /// Time until the next scheduled cycle, if one is scheduled
    pub next_warming_in: Option<Duration>,
}

struct SchedulerInner {
    cache: Arc<CacheService>,
    metrics: Arc<MetricsRecorder>,
    config: WarmingConfig,
    entries: RwLock<HashMap<String, WarmingEntry>>,
    running: AtomicBool,
    warming: AtomicBool,
    stop: Notify,
    next_cycle_at: RwLock<Option<DateTime<Utc>>>,
    last_warm_time: RwLock<Option<DateTime<Utc>>>,
}

/// Periodic warming scheduler with bounded concurrency and retry
pub struct WarmingScheduler {
    inner: Arc<SchedulerInner>,
}

impl WarmingScheduler {
    pub fn new(
        cache: Arc<CacheService>,
        metrics: Arc<MetricsRecorder>,
        config: WarmingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                metrics,
                config,
                entries: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                warming: AtomicBool::new(false),
                stop: Notify::new(),
                next_cycle_at: RwLock::new(None),
                last_warm_time: RwLock::new(None),
            }),
        }
    }

    /// Register a warmable entry
    ///
    /// Registering an existing key replaces its factory, TTL, and priority
    /// and clears its warming history.
    pub async fn register<F, Fut>(&self, key: impl Into<String>, priority: u8, ttl: Duration, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let key = key.into();
        let wrapped: WarmingFactory = Arc::new(move || Box::pin(factory()));

        let mut entries = self.inner.entries.write().await;
        debug!("Registered warming entry: {} (priority {})", key, priority);
        entries.insert(
            key.clone(),
            WarmingEntry {
                key,
                ttl,
                priority,
                last_warmed: None,
                factory: wrapped,
            },
        );
    }

    /// Remove an entry from the registry; returns whether it existed
    pub async fn unregister(&self, key: &str) -> bool {
        let mut entries = self.inner.entries.write().await;
        let existed = entries.remove(key).is_some();
        if existed {
            debug!("Unregistered warming entry: {}", key);
        }
        existed
    }

    /// Start the periodic warming loop
    ///
    /// Idempotent: calling while a cycle is scheduled or in flight is a
    /// no-op. The first cycle runs immediately.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Warming scheduler already running");
            return;
        }

        info!(
            "Starting warming scheduler (interval: {:?}, max_concurrent: {})",
            self.inner.config.interval, self.inner.config.max_concurrent
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let started = Instant::now();
                inner.run_cycle().await;

                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }

                let delay = inner.config.interval.saturating_sub(started.elapsed());
                {
                    let mut next = inner.next_cycle_at.write().await;
                    *next = Some(
                        Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::zero()),
                    );
                }

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = inner.stop.notified() => {}
                }

                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
            }

            *inner.next_cycle_at.write().await = None;
            debug!("Warming scheduler loop exited");
        });
    }

    /// Stop scheduling future cycles
    ///
    /// An in-flight batch runs to completion; only the pending schedule is
    /// cancelled.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.stop.notify_waiters();
        info!("Warming scheduler stopped");
    }

    /// Run a single warming cycle immediately
    ///
    /// Skipped if a cycle is already in flight.
    pub async fn warm_now(&self) {
        self.inner.run_cycle().await;
    }

    /// Whether the periodic loop is active
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// When the last full cycle completed
    pub async fn last_warm_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_warm_time.read().await
    }

    /// Registry and scheduling statistics
    pub async fn stats(&self) -> WarmingStats {
        let entries = self.inner.entries.read().await;

        let mut entries_by_priority: HashMap<u8, usize> = HashMap::new();
        for entry in entries.values() {
            *entries_by_priority.entry(entry.priority).or_insert(0) += 1;
        }

        let active_entries = entries
            .values()
            .filter(|e| e.last_warmed.is_some())
            .count();

        let next_warming_in = self
            .inner
            .next_cycle_at
            .read()
            .await
            .and_then(|at| (at - Utc::now()).to_std().ok());

        WarmingStats {
            total_entries: entries.len(),
            active_entries,
            entries_by_priority,
            is_warming: self.inner.warming.load(Ordering::SeqCst),
            next_warming_in,
        }
    }
}

impl SchedulerInner {
    /// One full warming pass over the registry
    async fn run_cycle(&self) {
        // No two cycles run concurrently
        if self
            .warming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Warming cycle already in flight, skipping");
            return;
        }

        let mut ordered: Vec<WarmingEntry> = {
            let entries = self.entries.read().await;
            entries.values().cloned().collect()
        };

        if ordered.is_empty() {
            debug!("No warming entries registered, skipping cycle");
            self.warming.store(false, Ordering::SeqCst);
            return;
        }

        let started = Instant::now();
        info!("Starting warming cycle for {} entries", ordered.len());

        // Oldest (or never) warmed first; priority breaks ties so
        // co-registered high-priority entries refresh ahead of low-priority
        // ones
        ordered.sort_by(|a, b| match (a.last_warmed, b.last_warmed) {
            (None, None) => b.priority.cmp(&a.priority),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y).then(b.priority.cmp(&a.priority)),
        });

        let mut warmed = 0usize;
        let mut failed = 0usize;

        for batch in ordered.chunks(self.config.max_concurrent.max(1)) {
            let mut handles = Vec::with_capacity(batch.len());

            for entry in batch {
                let entry = entry.clone();
                let cache = self.cache.clone();
                let metrics = self.metrics.clone();
                let config = self.config.clone();

                handles.push(tokio::spawn(async move {
                    let key = entry.key.clone();
                    let outcome = warm_entry(entry, cache, metrics, config).await;
                    (key, outcome)
                }));
            }

            for result in join_all(handles).await {
                match result {
                    Ok((key, Ok(()))) => {
                        warmed += 1;
                        let mut entries = self.entries.write().await;
                        if let Some(entry) = entries.get_mut(&key) {
                            entry.last_warmed = Some(Utc::now());
                        }
                    }
                    Ok((key, Err(e))) => {
                        failed += 1;
                        error!("Warming permanently failed for {}: {}", key, e);
                    }
                    Err(e) => {
                        failed += 1;
                        error!("Warming task panicked: {}", e);
                    }
                }
            }
        }

        *self.last_warm_time.write().await = Some(Utc::now());
        self.warming.store(false, Ordering::SeqCst);

        info!(
            "Warming cycle complete: {} warmed, {} failed in {:?}",
            warmed,
            failed,
            started.elapsed()
        );
    }
}

/// Refresh a single entry with bounded retry
async fn warm_entry(
    entry: WarmingEntry,
    cache: Arc<CacheService>,
    metrics: Arc<MetricsRecorder>,
    config: WarmingConfig,
) -> Result<()> {
    let max_attempts = config.retry_count + 1;
    let mut attempt = 1u32;

    loop {
        let started = Instant::now();

        match (entry.factory)().await {
            Ok(value) => {
                cache.set(&entry.key, &value, Some(entry.ttl)).await?;
                metrics
                    .record_hit(started.elapsed().as_secs_f64() * 1000.0)
                    .await;
                debug!(
                    "Warmed {} (attempt {}/{})",
                    entry.key, attempt, max_attempts
                );
                return Ok(());
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Warming factory failed for {} (attempt {}/{}), retrying after {:?}: {}",
                    entry.key, attempt, max_attempts, config.retry_delay, e
                );
                attempt += 1;
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(e) => {
                metrics.record_error().await;
                return Err(CacheError::Factory(format!(
                    "{} attempts exhausted for {}: {}",
                    max_attempts, entry.key, e
                )));
            }
        }
    }
}
