//! # Typed TTL Cache
//!
//! The cache service provides typed get/set/get-or-set over a remote
//! key-value store, with TTL policy, JSON serialization, and metrics
//! reporting.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: per-entry expiry enforced by the backing store
//! - **Typed Access**: values serialize/deserialize through serde
//! - **Pattern Invalidation**: glob-based bulk deletes for upstream changes
//! - **Metrics Reporting**: hits, misses, errors and latency flow into an
//!   injected recorder
//! - **Advisory Locking**: cooperative lock-wait plus an atomic
//!   set-if-absent lock
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use traintrack_cache::cache::{CacheConfig, CacheService};
//! use traintrack_cache::metrics::MetricsRecorder;
//! use traintrack_cache::store::MemoryStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .prefix("rates:")
//!     .default_ttl(Duration::from_secs(3600))
//!     .build();
//!
//! let cache = CacheService::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MetricsRecorder::with_defaults()),
//!     config,
//! );
//!
//! cache.set("award:MA000025", &26.55f64, None).await?;
//!
//! if let Some(rate) = cache.get::<f64>("award:MA000025").await? {
//!     println!("Cached rate: {}", rate);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod service;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use service::CacheService;
