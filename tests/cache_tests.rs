use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wacc_kernel::cache::{CacheStatus, ResultCache};
use wacc_kernel::config::CacheConfig;
use wacc_kernel::engine::{
    BuildUpComponent, CapitalWeights, CostOfDebtMode, Fingerprint, InputSnapshot, WaccBreakdown,
};
use wacc_kernel::CalculationError;

fn fingerprint(tax_rate: f64) -> Fingerprint {
    Fingerprint::of(&InputSnapshot::new(
        vec![BuildUpComponent::new("risk_free_rate", 12.5)],
        vec![4.0, 50.0, 4.0, 50.0],
        CapitalWeights {
            debt: 40.0,
            equity: 60.0,
        },
        tax_rate,
        CostOfDebtMode::WeightedRates,
    ))
}

fn breakdown(fingerprint: Fingerprint, wacc: f64) -> WaccBreakdown {
    WaccBreakdown {
        fingerprint,
        mode: CostOfDebtMode::WeightedRates,
        cost_of_equity: 12.5,
        pre_tax_cost_of_debt: 4.0,
        after_tax_cost_of_debt: 3.0,
        equity_weight: 0.6,
        debt_weight: 0.4,
        equity_contribution: 7.5,
        debt_contribution: 1.2,
        wacc,
    }
}

fn cache(capacity: usize, ttl_secs: u64) -> Arc<ResultCache> {
    Arc::new(ResultCache::new(CacheConfig { capacity, ttl_secs }))
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_per_fingerprint() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);
    let computations = Arc::new(AtomicUsize::new(0));

    // 1. Eight callers race on the same key while the leader is slow
    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let computations = Arc::clone(&computations);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(breakdown(fp, 8.7))
                })
                .await
        }));
    }

    let mut statuses = Vec::new();
    let mut shared = Vec::new();
    for handle in handles {
        let (value, status) = handle.await.unwrap().unwrap();
        statuses.push(status);
        shared.push(value);
    }

    // 2. One computation, one miss, everyone else joined
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(statuses.iter().filter(|s| **s == CacheStatus::Miss).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == CacheStatus::Joined).count(), 7);
    assert!(shared.iter().all(|b| Arc::ptr_eq(b, &shared[0])), "same Arc for every waiter");

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.joined, 7);
    assert_eq!(stats.ready, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_fingerprints_compute_independently() {
    let cache = cache(16, 0);
    let computations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..4 {
        let cache = Arc::clone(&cache);
        let computations = Arc::clone(&computations);
        let fp = fingerprint(10.0 + i as f64);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(breakdown(fp, i as f64))
                })
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().1, CacheStatus::Miss);
    }
    assert_eq!(computations.load(Ordering::SeqCst), 4);
    assert_eq!(cache.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_shared_and_not_cached() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err(CalculationError::ComputationFailure("overflow".into()))
                })
                .await
        }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err, CalculationError::ComputationFailure("overflow".into()));
    }
    assert!(cache.is_empty(), "failed entry removed");

    // Next request computes from scratch.
    let (_, status) = cache
        .get_or_compute(fp, || async move { Ok(breakdown(fp, 8.7)) })
        .await
        .unwrap();
    assert_eq!(status, CacheStatus::Miss);
    assert!(cache.contains(fp));
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_computation_delivers_but_does_not_retain() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);

    let leader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(breakdown(fp, 8.7))
                })
                .await
        })
    };
    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache
                .get_or_compute(fp, || async move { Ok(breakdown(fp, -1.0)) })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.stats().pending, 1);
    cache.clear();

    let (_, leader_status) = leader.await.unwrap().unwrap();
    let (value, waiter_status) = waiter.await.unwrap().unwrap();
    assert_eq!(leader_status, CacheStatus::Miss);
    assert_eq!(waiter_status, CacheStatus::Joined);
    assert_eq!(value.wacc, 8.7, "waiter received the leader's value");
    assert!(cache.is_empty(), "result of a cleared computation is not retained");
}

#[tokio::test(start_paused = true)]
async fn test_caller_after_clear_joins_in_flight_computation() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);
    let computations = Arc::new(AtomicUsize::new(0));

    let spawn_caller = |delay_ms: u64, wacc: f64| {
        let cache = Arc::clone(&cache);
        let computations = Arc::clone(&computations);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            cache
                .get_or_compute(fp, || async move {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(breakdown(fp, wacc))
                })
                .await
        })
    };

    // 1. Leader starts at t=0, cache cleared at t=10, second caller at t=15
    let leader = spawn_caller(0, 8.7);
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.clear();
    let late = spawn_caller(5, -1.0);

    let (leader_value, leader_status) = leader.await.unwrap().unwrap();
    let (late_value, late_status) = late.await.unwrap().unwrap();

    // 2. Still one computation; the late caller joined it
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(leader_status, CacheStatus::Miss);
    assert_eq!(late_status, CacheStatus::Joined);
    assert!(Arc::ptr_eq(&leader_value, &late_value));
    assert!(cache.is_empty(), "detached result not retained");

    // 3. The next request recomputes
    let (_, status) = cache
        .get_or_compute(fp, || async move { Ok(breakdown(fp, 8.7)) })
        .await
        .unwrap();
    assert_eq!(status, CacheStatus::Miss);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_in_flight_keeps_single_flight() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);
    let computations = Arc::new(AtomicUsize::new(0));

    let leader = {
        let cache = Arc::clone(&cache);
        let computations = Arc::clone(&computations);
        tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(breakdown(fp, 8.7))
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(cache.invalidate(fp), "in-flight entry counts as present");

    let (_, status) = cache
        .get_or_compute(fp, || async move { Ok(breakdown(fp, -1.0)) })
        .await
        .unwrap();
    assert_eq!(status, CacheStatus::Joined);
    leader.await.unwrap().unwrap();

    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert!(!cache.contains(fp));
}

#[tokio::test]
async fn test_lru_eviction_over_capacity() {
    let cache = cache(2, 0);
    let (a, b, c) = (fingerprint(10.0), fingerprint(20.0), fingerprint(30.0));

    for fp in [a, b] {
        cache
            .get_or_compute(fp, || async move { Ok(breakdown(fp, 1.0)) })
            .await
            .unwrap();
    }
    // Touch `a` so `b` becomes least recently used.
    let (_, status) = cache
        .get_or_compute(a, || async move { Ok(breakdown(a, 1.0)) })
        .await
        .unwrap();
    assert_eq!(status, CacheStatus::Hit);

    cache
        .get_or_compute(c, || async move { Ok(breakdown(c, 1.0)) })
        .await
        .unwrap();

    assert!(cache.contains(a));
    assert!(!cache.contains(b), "LRU victim evicted");
    assert!(cache.contains(c));
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.access_count(a), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_ttl_expiry() {
    let cache = cache(16, 60);
    let fp = fingerprint(25.0);
    let other = fingerprint(30.0);

    for key in [fp, other] {
        cache
            .get_or_compute(key, || async move { Ok(breakdown(key, 1.0)) })
            .await
            .unwrap();
    }

    tokio::time::advance(Duration::from_secs(30)).await;
    let (_, status) = cache
        .get_or_compute(fp, || async move { Ok(breakdown(fp, 2.0)) })
        .await
        .unwrap();
    assert_eq!(status, CacheStatus::Hit, "still fresh");

    tokio::time::advance(Duration::from_secs(31)).await;
    let (value, status) = cache
        .get_or_compute(fp, || async move { Ok(breakdown(fp, 2.0)) })
        .await
        .unwrap();
    assert_eq!(status, CacheStatus::Miss, "TTL runs from creation, not last access");
    assert_eq!(value.wacc, 2.0);

    assert_eq!(cache.purge_expired(), 1, "the untouched entry expired too");
    assert_eq!(cache.stats().expirations, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_leader_hands_over() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);

    // 1. Leader starts a slow computation, then gets aborted
    let leader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(breakdown(fp, 1.0))
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_compute(fp, || async move { Ok(breakdown(fp, 2.0)) })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    leader.abort();

    // 2. Waiter takes over and computes its own value
    let (value, status) = waiter.await.unwrap().unwrap();
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(value.wacc, 2.0);
    assert!(cache.contains(fp));
}

#[tokio::test]
async fn test_invalidate() {
    let cache = cache(16, 0);
    let fp = fingerprint(25.0);
    cache
        .get_or_compute(fp, || async move { Ok(breakdown(fp, 1.0)) })
        .await
        .unwrap();

    assert!(cache.invalidate(fp));
    assert!(!cache.invalidate(fp));
    assert!(cache.is_empty());
}
