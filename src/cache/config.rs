//! Configuration for the cache service

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the cache service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespace prefix applied to every key
    pub prefix: String,

    /// Default time-to-live for entries stored without an explicit TTL
    pub default_ttl: Duration,

    /// TTL jitter factor (0.0 - 1.0)
    /// Adds random variation to expiry so co-written keys do not all
    /// expire in the same instant
    pub ttl_jitter: f64,

    /// Poll interval for advisory lock waits
    pub lock_poll_interval: Duration,

    /// Enable metrics recording
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "traintrack:".to_string(),
            // 1 hour default TTL
            default_ttl: Duration::from_secs(3600),
            ttl_jitter: 0.0,
            lock_poll_interval: Duration::from_millis(100),
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_jitter < 0.0 || self.ttl_jitter > 1.0 {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        if self.lock_poll_interval.is_zero() {
            return Err("lock_poll_interval must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Apply the configured jitter to a TTL, rounded to whole seconds
    ///
    /// TTLs on the wire are always whole seconds; the result never drops
    /// below one second.
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return ttl;
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).round().max(1.0);

        Duration::from_secs(final_secs as u64)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    prefix: Option<String>,
    default_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    lock_poll_interval: Option<Duration>,
    enable_metrics: Option<bool>,
}

impl CacheConfigBuilder {
    /// Set the key namespace prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set the advisory lock poll interval
    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = Some(interval);
        self
    }

    /// Enable or disable metrics recording
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            prefix: self.prefix.unwrap_or(defaults.prefix),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            lock_poll_interval: self
                .lock_poll_interval
                .unwrap_or(defaults.lock_poll_interval),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }
}

/// Preset configurations for common TTL classes
impl CacheConfig {
    /// Configuration for time-sensitive data (short TTL)
    pub fn realtime() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            ttl_jitter: 0.1,
            ..Default::default()
        }
    }

    /// Configuration for relatively static content (long TTL)
    pub fn static_content() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 3600),
            ttl_jitter: 0.05,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.prefix, "traintrack:");
        assert!(config.enable_metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid = CacheConfig::default();
        invalid.ttl_jitter = 1.5;
        assert!(invalid.validate().is_err());

        let mut invalid = CacheConfig::default();
        invalid.lock_poll_interval = Duration::ZERO;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .prefix("rates:")
            .default_ttl(Duration::from_secs(600))
            .enable_metrics(false)
            .build();

        assert_eq!(config.prefix, "rates:");
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_ttl_with_jitter() {
        let config = CacheConfig {
            ttl_jitter: 0.1,
            ..Default::default()
        };

        let base = Duration::from_secs(3600);
        let ttl = config.ttl_with_jitter(base);

        assert!(ttl.as_secs_f64() >= 3600.0 * 0.9 - 1.0);
        assert!(ttl.as_secs_f64() <= 3600.0 * 1.1 + 1.0);
    }

    #[test]
    fn test_ttl_without_jitter_is_exact() {
        let config = CacheConfig::default();
        let base = Duration::from_secs(120);
        assert_eq!(config.ttl_with_jitter(base), base);
    }

    #[test]
    fn test_preset_configs() {
        assert_eq!(CacheConfig::realtime().default_ttl, Duration::from_secs(300));
        assert_eq!(
            CacheConfig::static_content().default_ttl,
            Duration::from_secs(24 * 3600)
        );
    }
}
