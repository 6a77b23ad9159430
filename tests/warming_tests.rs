//! Integration tests for the warming scheduler
//!
//! These tests verify the complete warming behavior:
//! - Priority-ordered cycles and the concurrency bound
//! - Bounded retry with permanent-failure reporting
//! - Idempotent start, prompt stop, and scheduling stats
//! - Warmed values being served by the read path

use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use traintrack_cache::cache::{CacheConfig, CacheService};
use traintrack_cache::metrics::MetricsRecorder;
use traintrack_cache::store::MemoryStore;
use traintrack_cache::warming::{WarmingConfig, WarmingScheduler};
use traintrack_cache::CacheError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn setup(config: WarmingConfig) -> (Arc<CacheService>, Arc<MetricsRecorder>, WarmingScheduler) {
    let metrics = Arc::new(MetricsRecorder::with_defaults());
    let cache = Arc::new(CacheService::new(
        Arc::new(MemoryStore::new()),
        metrics.clone(),
        CacheConfig::default(),
    ));
    let scheduler = WarmingScheduler::new(cache.clone(), metrics.clone(), config);
    (cache, metrics, scheduler)
}

#[tokio::test]
async fn test_higher_priority_entry_warms_first() {
    let (_, _, scheduler) = setup(WarmingConfig {
        interval: Duration::from_secs(300),
        max_concurrent: 1,
        retry_count: 0,
        retry_delay: Duration::from_millis(10),
    });

    let invocations: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // Registered low-priority first to prove registration order does not win
    let log = invocations.clone();
    scheduler
        .register("template", 1, Duration::from_secs(60), move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("template");
                Ok(json!("template"))
            }
        })
        .await;

    let log = invocations.clone();
    scheduler
        .register("current_rate", 2, Duration::from_secs(60), move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("current_rate");
                Ok(json!("rate"))
            }
        })
        .await;

    scheduler.warm_now().await;

    let seen = invocations.lock().unwrap().clone();
    assert_eq!(seen, vec!["current_rate", "template"]);
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let (_, _, scheduler) = setup(WarmingConfig {
        interval: Duration::from_secs(300),
        max_concurrent: 2,
        retry_count: 0,
        retry_delay: Duration::from_millis(10),
    });

    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    for i in 0..5 {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        scheduler
            .register(format!("entry{}", i), 1, Duration::from_secs(60), move || {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!(true))
                }
            })
            .await;
    }

    scheduler.warm_now().await;

    // At no sampled instant were more than two factories pending
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
    assert_eq!(scheduler.stats().await.active_entries, 5);
}

#[tokio::test]
async fn test_retry_then_success_caches_value() {
    let (cache, _, scheduler) = setup(WarmingConfig {
        interval: Duration::from_secs(300),
        max_concurrent: 2,
        retry_count: 2,
        retry_delay: Duration::from_millis(10),
    });

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    scheduler
        .register("flaky", 2, Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(CacheError::Factory("transient outage".to_string()))
                } else {
                    Ok(json!({"hourly": 26.55}))
                }
            }
        })
        .await;

    scheduler.warm_now().await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let cached: Option<serde_json::Value> = cache.get("flaky").await.unwrap();
    assert_eq!(cached, Some(json!({"hourly": 26.55})));
}

#[tokio::test]
async fn test_permanent_failure_counts_attempts_and_keeps_entry() {
    let (_, metrics, scheduler) = setup(WarmingConfig {
        interval: Duration::from_secs(300),
        max_concurrent: 2,
        retry_count: 2,
        retry_delay: Duration::from_millis(10),
    });

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    scheduler
        .register("down", 3, Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<serde_json::Value, _>(CacheError::Factory("provider down".to_string()))
            }
        })
        .await;

    scheduler.warm_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Next cycle retries again rather than unregistering
    scheduler.warm_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let stats = scheduler.stats().await;
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.active_entries, 0);
    assert!(metrics.snapshot().await.errors >= 2);
}

#[tokio::test]
async fn test_periodic_loop_rewarms_entries() {
    init_tracing();
    let (cache, _, scheduler) = setup(WarmingConfig {
        interval: Duration::from_millis(40),
        max_concurrent: 2,
        retry_count: 0,
        retry_delay: Duration::from_millis(10),
    });

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    scheduler
        .register("rate", 3, Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(26.55))
            }
        })
        .await;

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop();

    // First cycle runs immediately; at least one rescheduled cycle followed
    assert!(calls.load(Ordering::SeqCst) >= 2);
    let cached: Option<serde_json::Value> = cache.get("rate").await.unwrap();
    assert_eq!(cached, Some(json!(26.55)));

    let after_stop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let (_, _, scheduler) = setup(WarmingConfig {
        interval: Duration::from_millis(40),
        max_concurrent: 2,
        retry_count: 0,
        retry_delay: Duration::from_millis(10),
    });

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    scheduler
        .register("entry", 1, Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(json!(1))
            }
        })
        .await;

    scheduler.start();
    scheduler.start();
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.stop();

    // A single loop ran: the immediate cycle plus at most one reschedule
    assert!(calls.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_stats_report_schedule_state() {
    let (_, _, scheduler) = setup(WarmingConfig {
        interval: Duration::from_secs(300),
        max_concurrent: 2,
        retry_count: 0,
        retry_delay: Duration::from_millis(10),
    });

    scheduler
        .register("a", 1, Duration::from_secs(60), || async { Ok(json!(1)) })
        .await;
    scheduler
        .register("b", 3, Duration::from_secs(60), || async { Ok(json!(2)) })
        .await;

    let stats = scheduler.stats().await;
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.entries_by_priority.get(&1), Some(&1));
    assert_eq!(stats.entries_by_priority.get(&3), Some(&1));
    assert!(!stats.is_warming);
    assert!(stats.next_warming_in.is_none());

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = scheduler.stats().await;
    assert_eq!(stats.active_entries, 2);
    let next = stats.next_warming_in.expect("next cycle scheduled");
    assert!(next <= Duration::from_secs(300));

    scheduler.stop();
}
