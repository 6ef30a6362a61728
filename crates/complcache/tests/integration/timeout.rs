use std::time::Duration;

use complcache::{CacheError, CompletionCache};
use complcache_test::{CountingProducer, return_after};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_timeout() {
    complcache_test::setup();

    let fill = Duration::from_millis(100);
    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_millis(100),
        fill,
        Duration::from_secs(1),
    )
    .unwrap();

    // try to add an item, but take too long
    let start = Instant::now();
    let result = cache
        .get_or_create("key", || return_after("badval", Duration::from_millis(500)))
        .await;

    assert_eq!(result, Err(CacheError::Timeout(fill)));
    let elapsed = start.elapsed();
    assert!(elapsed >= fill);
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_cached() {
    complcache_test::setup();

    let fill = Duration::from_millis(100);
    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_secs(60),
        fill,
        Duration::from_secs(60),
    )
    .unwrap();
    let counter = CountingProducer::new();

    let result = cache
        .get_or_create("key", counter.returning("late", Duration::from_millis(500)))
        .await;
    assert_eq!(result, Err(CacheError::Timeout(fill)));

    // the producer finishes in the background, which does not change the entry
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.get(&"key").await, Err(CacheError::Timeout(fill)));

    let result = cache
        .get_or_create("key", counter.returning("fresh", Duration::ZERO))
        .await;
    assert_eq!(result, Err(CacheError::Timeout(fill)));
    assert_eq!(counter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_waiters_time_out_with_the_entry() {
    complcache_test::setup();

    let fill = Duration::from_millis(100);
    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_secs(60),
        fill,
        Duration::from_secs(60),
    )
    .unwrap();

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("key", || return_after("late", Duration::from_secs(1)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // joining halfway through only waits for the remainder of the fill duration
    let start = Instant::now();
    assert_eq!(cache.get(&"key").await, Err(CacheError::Timeout(fill)));
    assert!(start.elapsed() <= Duration::from_millis(50));

    assert_eq!(first.await.unwrap(), Err(CacheError::Timeout(fill)));
}
