//! Cache performance monitoring
//!
//! The recorder keeps four counters (hits, misses, errors, evictions) and a
//! bounded rolling sample of operation latencies. Counters accumulate until
//! the periodic report fires, then reset, so figures are always "since last
//! report". This bounds memory in a long-running process.
//!
//! The recorder is an explicitly constructed, dependency-injected instance
//! (`Arc<MetricsRecorder>`); there is no process-wide global.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Configuration for the metrics recorder
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Interval between snapshot reports (each report resets the counters)
    pub report_interval: Duration,
    /// Capacity of the rolling latency sample buffer
    pub max_latency_samples: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(60),
            max_latency_samples: 1000,
        }
    }
}

/// In-memory recorder for cache counters and latency samples
pub struct MetricsRecorder {
    config: MetricsConfig,
    inner: RwLock<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    hits: u64,
    misses: u64,
    errors: u64,
    evictions: u64,
    latencies_ms: VecDeque<f64>,
}

impl MetricsRecorder {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(MetricsInner::default()),
        }
    }

    /// Recorder with the default 60s report interval and 1000-sample buffer
    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default())
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Record a cache hit with its observed latency
    pub async fn record_hit(&self, latency_ms: f64) {
        let mut inner = self.inner.write().await;
        inner.hits += 1;
        push_latency(&mut inner, latency_ms, self.config.max_latency_samples);
    }

    /// Record a cache miss with its observed latency
    pub async fn record_miss(&self, latency_ms: f64) {
        let mut inner = self.inner.write().await;
        inner.misses += 1;
        push_latency(&mut inner, latency_ms, self.config.max_latency_samples);
    }

    /// Record a write latency without touching the hit/miss counters
    pub async fn record_write(&self, latency_ms: f64) {
        let mut inner = self.inner.write().await;
        push_latency(&mut inner, latency_ms, self.config.max_latency_samples);
    }

    /// Record a store or serialization failure
    pub async fn record_error(&self) {
        let mut inner = self.inner.write().await;
        inner.errors += 1;
    }

    /// Record explicitly removed entries
    pub async fn record_evictions(&self, count: u64) {
        let mut inner = self.inner.write().await;
        inner.evictions += count;
    }

    /// Compute the current snapshot without resetting
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;

        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (inner.hits as f64 / total as f64) * 100.0
        };

        // Percentiles run over a sorted copy; the live buffer stays FIFO
        let mut sorted: Vec<f64> = inner.latencies_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        MetricsSnapshot {
            hits: inner.hits,
            misses: inner.misses,
            errors: inner.errors,
            evictions: inner.evictions,
            hit_rate,
            hit_rate_display: format!("{:.2}%", hit_rate),
            avg_latency_ms: avg,
            p95_latency_ms: percentile(&sorted, 95.0),
            p99_latency_ms: percentile(&sorted, 99.0),
            sample_count: sorted.len(),
        }
    }

    /// Reset all counters and the sample buffer
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        *inner = MetricsInner::default();
    }

    /// Log the current snapshot, then reset
    pub async fn report_and_reset(&self) -> MetricsSnapshot {
        let snapshot = self.snapshot().await;
        info!("Cache metrics: {}", snapshot);
        self.reset().await;
        snapshot
    }
}

fn push_latency(inner: &mut MetricsInner, latency_ms: f64, capacity: usize) {
    if inner.latencies_ms.len() >= capacity {
        inner.latencies_ms.pop_front();
    }
    inner.latencies_ms.push_back(latency_ms);
}

/// Nearest-rank percentile over an ascending-sorted slice
///
/// `index = ceil(p/100 * n) - 1`, clamped into range; empty input yields 0.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

/// Point-in-time view of the recorder, covering activity since the last reset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub evictions: u64,
    /// Hit rate as a percentage (0 when there were no requests)
    pub hit_rate: f64,
    /// Hit rate formatted to two decimal places, e.g. "98.75%"
    pub hit_rate_display: String,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub sample_count: usize,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, hit_rate: {}, errors: {}, evictions: {}, avg: {:.2}ms, p95: {:.2}ms, p99: {:.2}ms ({} samples)",
            self.hits,
            self.misses,
            self.hit_rate_display,
            self.errors,
            self.evictions,
            self.avg_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms,
            self.sample_count
        )
    }
}

/// Periodic reporting task
///
/// Sleeps for the configured interval, logs a snapshot, resets, repeats.
/// Spawn it alongside the recorder:
///
/// ```rust
/// use std::sync::Arc;
/// use traintrack_cache::metrics::{run_reporter, MetricsRecorder};
///
/// # async fn example() {
/// let recorder = Arc::new(MetricsRecorder::with_defaults());
/// tokio::spawn(run_reporter(recorder.clone()));
/// # }
/// ```
pub async fn run_reporter(recorder: Arc<MetricsRecorder>) {
    let interval = recorder.config.report_interval;
    info!("Starting cache metrics reporter (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;
        recorder.report_and_reset().await;
    }
}
