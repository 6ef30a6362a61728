use std::time::Duration;

use complcache::{CacheError, CompletionCache};
use complcache_test::{CountingProducer, return_after};

#[tokio::test(start_paused = true)]
async fn test_expire() {
    complcache_test::setup();

    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_secs(2),
        Duration::from_secs(8),
        Duration::from_secs(1),
    )
    .unwrap();

    // add value to cache
    let value = cache
        .get_or_create("key", || return_after("value", Duration::from_secs(1)))
        .await;
    assert_eq!(value, Ok("value"));

    // wait for it to expire
    tokio::time::sleep(Duration::from_secs(5)).await;

    // check that it got deleted
    assert_eq!(cache.get(&"key").await, Err(CacheError::NoSuchKey));
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_read_after_write_until_expiration() {
    complcache_test::setup();

    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_secs(10),
        Duration::from_secs(10),
        Duration::from_secs(1),
    )
    .unwrap();
    let counter = CountingProducer::new();

    let value = cache
        .get_or_create("key", counter.returning("value", Duration::from_secs(1)))
        .await;
    assert_eq!(value, Ok("value"));

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"key").await, Ok("value"));
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&"key").await, Err(CacheError::NoSuchKey));

    let value = cache
        .get_or_create("key", counter.returning("refreshed", Duration::ZERO))
        .await;
    assert_eq!(value, Ok("refreshed"));
    assert_eq!(counter.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_producer_yields_expired_entry() {
    complcache_test::setup();

    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_secs(1),
        Duration::from_secs(10),
        Duration::from_secs(60),
    )
    .unwrap();
    let counter = CountingProducer::new();

    // the expiration clock starts when the entry is requested, so the value is stale on arrival
    let value = cache
        .get_or_create("key", counter.returning("slow", Duration::from_secs(2)))
        .await;
    assert_eq!(value, Ok("slow"));
    assert_eq!(cache.get(&"key").await, Err(CacheError::NoSuchKey));

    let value = cache
        .get_or_create("key", counter.returning("again", Duration::ZERO))
        .await;
    assert_eq!(value, Ok("again"));
    assert_eq!(counter.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_pending_entry_starts_independent_production() {
    complcache_test::setup();

    let cache = CompletionCache::<&str, &str, ()>::new(
        Duration::from_secs(1),
        Duration::from_secs(10),
        Duration::from_secs(60),
    )
    .unwrap();
    let counter = CountingProducer::new();

    let first = {
        let cache = cache.clone();
        let producer = counter.returning("first", Duration::from_secs(3));
        tokio::spawn(async move { cache.get_or_create("key", producer).await })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;

    // the pending entry expired, so a new production is started right away
    let second = cache
        .get_or_create("key", counter.returning("second", Duration::from_millis(10)))
        .await;
    assert_eq!(second, Ok("second"));
    assert_eq!(counter.calls(), 2);

    // the original caller still gets the result of the production it waited on
    assert_eq!(first.await.unwrap(), Ok("first"));
}

#[tokio::test]
async fn test_maximum_durations() {
    complcache_test::setup();

    let cache =
        CompletionCache::<&str, &str, ()>::new(Duration::MAX, Duration::MAX, Duration::MAX)
            .unwrap();
    let producer = CountingProducer::new();

    let (first, second) = tokio::join!(
        cache.get_or_create("key", producer.returning("value", Duration::from_millis(10))),
        cache.get_or_create("key", producer.returning("other", Duration::from_millis(10))),
    );
    assert_eq!(first, Ok("value"));
    assert_eq!(second, Ok("value"));
    assert_eq!(producer.calls(), 1);

    // give the collector a chance to sweep
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.get(&"key").await, Ok("value"));
    assert_eq!(cache.len(), 1);

    assert_eq!(cache.close(), Ok(()));
}
