//! Cache middleware for the external award-rate provider
//!
//! Derives deterministic cache keys from structured request parameters,
//! assigns per-operation TTL classes (short for time-sensitive current
//! rates, long for relatively static classification hierarchies), and
//! exposes targeted and award-wide invalidation. Warming registration puts
//! current-rate keys ahead of classification templates.

use crate::cache::service::CacheService;
use crate::error::Result;
use crate::warming::WarmingScheduler;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Logical operations against the rate provider, each with its own TTL class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateOperation {
    /// Current base rate for an award classification
    BaseRate,
    /// Classification hierarchy for an award
    ClassificationList,
    /// Derived rate calculation (penalties, loadings, casual rates)
    RateCalculation,
    /// Validation of a proposed rate against the award minimum
    RateValidation,
}

impl RateOperation {
    /// TTL class for this operation
    ///
    /// Current-rate data goes stale when award determinations land, so it
    /// gets the short class; classification hierarchies barely move.
    pub fn ttl(&self) -> Duration {
        match self {
            RateOperation::BaseRate => Duration::from_secs(3600),
            RateOperation::ClassificationList => Duration::from_secs(24 * 3600),
            RateOperation::RateCalculation => Duration::from_secs(1800),
            RateOperation::RateValidation => Duration::from_secs(3600),
        }
    }

    /// Warming priority: current-rate keys refresh ahead of templates
    pub fn warming_priority(&self) -> u8 {
        match self {
            RateOperation::BaseRate => 3,
            RateOperation::RateCalculation => 2,
            RateOperation::RateValidation => 2,
            RateOperation::ClassificationList => 1,
        }
    }
}

impl fmt::Display for RateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateOperation::BaseRate => write!(f, "base_rate"),
            RateOperation::ClassificationList => write!(f, "classification_list"),
            RateOperation::RateCalculation => write!(f, "rate_calculation"),
            RateOperation::RateValidation => write!(f, "rate_validation"),
        }
    }
}

/// Canonical, order-independent parameter record
///
/// Parameters are held sorted by name and null values are dropped, so equal
/// parameter sets produce identical cache keys regardless of construction
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateParams {
    params: BTreeMap<String, Value>,
}

impl RateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; a value serializing to null is dropped, matching an
    /// omitted parameter
    pub fn with(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        if value != Value::Null {
            self.params.insert(name.into(), value);
        }
        self
    }

    /// Parameters for an award classification lookup
    pub fn for_award(award_code: &str, classification: &str) -> Self {
        Self::new()
            .with("award_code", award_code)
            .with("classification", classification)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Build the externally observable cache key for an operation
    ///
    /// Format: `<operation>:<k1>:<json(v1)>|<k2>:<json(v2)>` with parameter
    /// names in alphabetical order. Downstream tooling inspects keys in this
    /// shape, so it is a compatibility surface.
    pub fn cache_key(&self, operation: RateOperation) -> String {
        let parts: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| format!("{}:{}", name, value))
            .collect();

        format!("{}:{}", operation, parts.join("|"))
    }
}

/// Read-through cache for rate-provider lookups
///
/// The provider remains the system of record; everything cached here is
/// re-derivable by calling the factory again, so invalidation is always
/// safe.
pub struct RateLookupCache {
    cache: Arc<CacheService>,
}

impl RateLookupCache {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    /// Cached value for an operation, if present
    pub async fn get<T: DeserializeOwned>(
        &self,
        operation: RateOperation,
        params: &RateParams,
    ) -> Result<Option<T>> {
        self.cache.get(&params.cache_key(operation)).await
    }

    /// Return the cached value or invoke the provider factory and cache its
    /// result under the operation's TTL class
    ///
    /// Two concurrent misses for the same key both invoke the factory; see
    /// [`CacheService::get_or_set`].
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        operation: RateOperation,
        params: &RateParams,
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = params.cache_key(operation);
        debug!("Rate lookup: {}", key);
        self.cache
            .get_or_set(&key, Some(operation.ttl()), factory)
            .await
    }

    /// Drop the cached value for one operation and parameter set
    pub async fn invalidate(&self, operation: RateOperation, params: &RateParams) -> Result<()> {
        self.cache.delete(&params.cache_key(operation)).await
    }

    /// Drop every cached entry mentioning an award code, regardless of
    /// operation
    ///
    /// Used when upstream award data changes (a new determination, an
    /// updated classification structure). Returns the number of removed
    /// entries; zero matches is a no-op.
    pub async fn invalidate_award(&self, award_code: &str) -> Result<u64> {
        let removed = self
            .cache
            .delete_pattern(&format!("*{}*", award_code))
            .await?;
        info!(
            "Invalidated {} cached entries for award {}",
            removed, award_code
        );
        Ok(removed)
    }

    /// Register an operation for proactive warming
    ///
    /// The entry is keyed exactly as the read path would key it, warmed at
    /// the operation's priority, and cached under the operation's TTL class.
    pub async fn register_warming<F, Fut>(
        &self,
        scheduler: &WarmingScheduler,
        operation: RateOperation,
        params: &RateParams,
        factory: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let key = params.cache_key(operation);
        scheduler
            .register(key, operation.warming_priority(), operation.ttl(), factory)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::metrics::MetricsRecorder;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn rate_cache() -> RateLookupCache {
        let cache = Arc::new(CacheService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MetricsRecorder::with_defaults()),
            CacheConfig::default(),
        ));
        RateLookupCache::new(cache)
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(format!("{}", RateOperation::BaseRate), "base_rate");
        assert_eq!(
            format!("{}", RateOperation::ClassificationList),
            "classification_list"
        );
        assert_eq!(
            format!("{}", RateOperation::RateCalculation),
            "rate_calculation"
        );
        assert_eq!(
            format!("{}", RateOperation::RateValidation),
            "rate_validation"
        );
    }

    #[test]
    fn test_ttl_classes() {
        assert!(RateOperation::BaseRate.ttl() < RateOperation::ClassificationList.ttl());
        assert_eq!(RateOperation::RateCalculation.ttl(), Duration::from_secs(1800));
    }

    #[test]
    fn test_warming_priorities() {
        assert!(
            RateOperation::BaseRate.warming_priority()
                > RateOperation::ClassificationList.warming_priority()
        );
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = RateParams::new()
            .with("award_code", "MA000025")
            .with("level", 3);
        let b = RateParams::new()
            .with("level", 3)
            .with("award_code", "MA000025");

        assert_eq!(
            a.cache_key(RateOperation::BaseRate),
            b.cache_key(RateOperation::BaseRate)
        );
    }

    #[test]
    fn test_cache_key_differs_for_different_params() {
        let a = RateParams::new().with("a", 1).with("b", 2);
        let b = RateParams::new().with("a", 1).with("b", 3);

        assert_ne!(
            a.cache_key(RateOperation::BaseRate),
            b.cache_key(RateOperation::BaseRate)
        );
    }

    #[test]
    fn test_cache_key_format() {
        let params = RateParams::new()
            .with("award_code", "MA000025")
            .with("level", 3);

        assert_eq!(
            params.cache_key(RateOperation::BaseRate),
            "base_rate:award_code:\"MA000025\"|level:3"
        );
    }

    #[test]
    fn test_null_params_are_dropped() {
        let explicit = RateParams::new()
            .with("award_code", "MA000025")
            .with("state", Option::<String>::None);
        let omitted = RateParams::new().with("award_code", "MA000025");

        assert_eq!(explicit, omitted);
        assert_eq!(explicit.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_round_trip() {
        let rates = rate_cache();
        let params = RateParams::for_award("MA000025", "Level 3");

        let rate: f64 = rates
            .get_or_fetch(RateOperation::BaseRate, &params, || async { Ok(26.55) })
            .await
            .unwrap();
        assert_eq!(rate, 26.55);

        // Served from cache on the second call
        let cached: Option<f64> = rates.get(RateOperation::BaseRate, &params).await.unwrap();
        assert_eq!(cached, Some(26.55));
    }

    #[tokio::test]
    async fn test_invalidate_single_operation() {
        let rates = rate_cache();
        let params = RateParams::for_award("MA000025", "Level 3");

        let _: f64 = rates
            .get_or_fetch(RateOperation::BaseRate, &params, || async { Ok(26.55) })
            .await
            .unwrap();

        rates
            .invalidate(RateOperation::BaseRate, &params)
            .await
            .unwrap();

        let cached: Option<f64> = rates.get(RateOperation::BaseRate, &params).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_award_spans_operations() {
        let rates = rate_cache();
        let params = RateParams::for_award("MA000025", "Level 3");
        let other = RateParams::for_award("MA000003", "Level 1");

        let _: f64 = rates
            .get_or_fetch(RateOperation::BaseRate, &params, || async { Ok(26.55) })
            .await
            .unwrap();
        let _: Value = rates
            .get_or_fetch(RateOperation::ClassificationList, &params, || async {
                Ok(json!(["Level 1", "Level 2", "Level 3"]))
            })
            .await
            .unwrap();
        let _: f64 = rates
            .get_or_fetch(RateOperation::BaseRate, &other, || async { Ok(21.38) })
            .await
            .unwrap();

        let removed = rates.invalidate_award("MA000025").await.unwrap();
        assert_eq!(removed, 2);

        // The other award's entry survives
        let survivor: Option<f64> = rates.get(RateOperation::BaseRate, &other).await.unwrap();
        assert_eq!(survivor, Some(21.38));
    }

    #[tokio::test]
    async fn test_invalidate_award_with_no_entries_is_noop() {
        let rates = rate_cache();
        let removed = rates.invalidate_award("MA000099").await.unwrap();
        assert_eq!(removed, 0);
    }
}
