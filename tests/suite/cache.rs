//! Cache behaviour seen through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use depot_cache::{CacheError, LazyResourceCache, ManualClock, TtlCache};
use depot_types::{CacheKey, StartupError};
use futures_util::future::join_all;

#[tokio::test]
async fn concurrent_callers_share_one_computation() {
    let cache: LazyResourceCache<Arc<Vec<u32>>> = LazyResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let callers = (0..16).map(|_| {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        async move {
            cache
                .get_or_create(CacheKey::collection("buses"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, anyhow::Error>(Arc::new(vec![1, 2, 3]))
                })
                .await
        }
    });
    let values: Vec<_> = join_all(callers)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.coalesced + stats.hits, 15);
}

#[tokio::test]
async fn failures_reach_every_waiter_and_are_not_stored() {
    let cache: LazyResourceCache<u32> = LazyResourceCache::new();
    let key = CacheKey::new("service", "gps");

    let callers = (0..4).map(|_| {
        let cache = cache.clone();
        let key = key.clone();
        async move {
            cache
                .get_or_create(key, || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<u32, _>(anyhow::anyhow!("gateway refused connection"))
                })
                .await
        }
    });
    for outcome in join_all(callers).await {
        let err = outcome.unwrap_err();
        assert_eq!(err.key(), "service:gps");
        assert!(err.to_string().contains("gateway refused connection"));
    }
    assert!(cache.get(&key).is_none());

    let value = cache
        .get_or_create(key.clone(), || async { Ok::<_, anyhow::Error>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(cache.get(&key), Some(7));
}

#[tokio::test]
async fn computation_errors_convert_into_startup_errors() {
    let cache: LazyResourceCache<u32> = LazyResourceCache::new();
    let err = cache
        .get_or_create(CacheKey::collection("routes"), || async {
            Err::<u32, _>(anyhow::anyhow!("feed offline"))
        })
        .await
        .unwrap_err();

    match StartupError::from(err) {
        StartupError::Computation { key, cause } => {
            assert_eq!(key, "routes:all");
            assert!(cause.contains("feed offline"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn waiter_timeout_leaves_computation_running() {
    let cache: LazyResourceCache<&'static str> = LazyResourceCache::new();
    let key = CacheKey::collection("students");

    let err = cache
        .get_or_create_within(key.clone(), Duration::from_millis(50), || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, anyhow::Error>("loaded")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Timeout { .. }));
    assert!(cache.is_in_flight(&key));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.get(&key), Some("loaded"));
    assert!(!cache.is_in_flight(&key));
}

#[tokio::test]
async fn ttl_entries_refresh_once_after_expiry() {
    let clock = ManualClock::new();
    let cache: TtlCache<Arc<String>> = TtlCache::with_clock(Arc::new(clock.clone()));
    let key = CacheKey::collection("drivers");
    let ttl = Duration::from_secs(30);
    let loads = Arc::new(AtomicUsize::new(0));

    let load = |loads: Arc<AtomicUsize>| {
        move || async move {
            let n = loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(Arc::new(format!("roster v{n}")))
        }
    };

    let first = cache
        .get_or_compute(key.clone(), ttl, load(Arc::clone(&loads)))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(29));
    let cached = cache
        .get_or_compute(key.clone(), ttl, load(Arc::clone(&loads)))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &cached));

    clock.advance(Duration::from_secs(1));
    assert!(cache.get(&key).is_none());
    let refreshed = cache
        .get_or_compute(key.clone(), ttl, load(Arc::clone(&loads)))
        .await
        .unwrap();
    assert_eq!(refreshed.as_str(), "roster v1");
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().expired, 1);
}
