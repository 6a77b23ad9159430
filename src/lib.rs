//! # TrainTrack Cache (traintrack-cache)
//!
//! Caching layer for the TrainTrack training-records CRM: a typed TTL cache
//! over a Redis-compatible backing store, a metrics recorder, a
//! priority-based warming scheduler, and a middleware that derives cache
//! keys and TTL classes for the external award-rate provider.
//!
//! ## Features
//!
//! - Typed get/set/get-or-set with JSON serialization and TTL policy
//! - Lazy, retried connection management for the backing store
//! - Hit-rate and latency-distribution metrics with periodic reporting
//! - Proactive warming with priorities, bounded concurrency, and retry
//! - Deterministic, order-independent cache keys for rate lookups
//!
//! The cache is never the system of record: every stored value is
//! re-derivable from its originating factory, so losing every entry costs
//! latency, never correctness.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use traintrack_cache::cache::{CacheConfig, CacheService};
//! use traintrack_cache::metrics::{run_reporter, MetricsRecorder};
//! use traintrack_cache::rates::{RateLookupCache, RateOperation, RateParams};
//! use traintrack_cache::store::RedisStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(RedisStore::from_env()?);
//!     let metrics = Arc::new(MetricsRecorder::with_defaults());
//!     tokio::spawn(run_reporter(metrics.clone()));
//!
//!     let cache = Arc::new(CacheService::new(
//!         store,
//!         metrics,
//!         CacheConfig::default(),
//!     ));
//!
//!     let rates = RateLookupCache::new(cache);
//!     let params = RateParams::for_award("MA000025", "Level 3");
//!
//!     let hourly: f64 = rates
//!         .get_or_fetch(RateOperation::BaseRate, &params, || async {
//!             // call the rate provider here
//!             Ok(26.55)
//!         })
//!         .await?;
//!
//!     println!("Base rate: {}", hourly);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod metrics;
pub mod rates;
pub mod store;
pub mod warming;

// Re-export main types for convenience
pub use cache::{CacheConfig, CacheConfigBuilder, CacheService};
pub use error::{CacheError, Result};
pub use metrics::{run_reporter, MetricsConfig, MetricsRecorder, MetricsSnapshot};
pub use rates::{RateLookupCache, RateOperation, RateParams};
pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreConfig};
pub use warming::{WarmingConfig, WarmingEntry, WarmingScheduler, WarmingStats};
