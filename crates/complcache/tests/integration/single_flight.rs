use std::time::Duration;

use complcache::{CacheError, CompletionCache};
use complcache_test::{CountingProducer, return_after};
use futures::future::join_all;

fn minute() -> Duration {
    Duration::from_secs(60)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_run_producer_once() {
    complcache_test::setup();

    let cache = CompletionCache::<&str, String, String>::new(minute(), minute(), minute()).unwrap();
    let counter = CountingProducer::new();

    let requests = (0..32).map(|_| {
        let cache = cache.clone();
        let producer = counter.returning("value".to_owned(), Duration::from_millis(50));
        tokio::spawn(async move { cache.get_or_create("key", producer).await })
    });
    let results = join_all(requests).await;

    assert_eq!(counter.calls(), 1);
    for result in results {
        assert_eq!(result.unwrap(), Ok("value".to_owned()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_error() {
    complcache_test::setup();

    let cache = CompletionCache::<u32, u32, String>::new(minute(), minute(), minute()).unwrap();
    let counter = CountingProducer::new();

    let requests = (0..8).map(|_| {
        let producer = counter.failing("connection refused".to_owned(), Duration::from_millis(10));
        cache.get_or_create(7, producer)
    });
    let results = join_all(requests).await;

    assert_eq!(counter.calls(), 1);
    for result in results {
        assert_eq!(
            result,
            Err(CacheError::Producer("connection refused".to_owned()))
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_keys_do_not_block() {
    complcache_test::setup();

    let cache = CompletionCache::<&str, &str, ()>::new(minute(), minute(), minute()).unwrap();

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("slow", || return_after("slow", Duration::from_secs(30)))
                .await
        })
    };
    tokio::task::yield_now().await;

    let start = tokio::time::Instant::now();
    let fast = cache
        .get_or_create("fast", || return_after("fast", Duration::from_millis(10)))
        .await;
    assert_eq!(fast, Ok("fast"));
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(slow.await.unwrap(), Ok("slow"));
}

#[tokio::test(start_paused = true)]
async fn test_hit() {
    complcache_test::setup();

    let cache = CompletionCache::<String, String, String>::new(minute(), minute(), minute()).unwrap();

    // add a bunch of values to the cache
    let fills = (0..1000).map(|i| {
        let cache = cache.clone();
        tokio::spawn(async move {
            let value = format!("value{i}");
            cache
                .get_or_create(format!("key{i}"), move || {
                    return_after(value, Duration::from_millis(100))
                })
                .await
        })
    });
    for result in join_all(fills).await {
        assert!(result.unwrap().is_ok());
    }

    // get values from the cache, without ever invoking a producer
    let counter = CountingProducer::new();
    let mut lookups = Vec::with_capacity(2000);
    for i in 0..1000 {
        let key = format!("key{i}");

        let cache_ = cache.clone();
        let key_ = key.clone();
        lookups.push(tokio::spawn(async move { cache_.get(&key_).await }));

        let cache_ = cache.clone();
        let producer = counter.failing("should not have been called".to_owned(), Duration::ZERO);
        lookups.push(tokio::spawn(
            async move { cache_.get_or_create(key, producer).await },
        ));
    }

    for (i, result) in join_all(lookups).await.into_iter().enumerate() {
        let expected = format!("value{}", i / 2);
        assert_eq!(result.unwrap(), Ok(expected));
    }
    assert_eq!(counter.calls(), 0);
}
