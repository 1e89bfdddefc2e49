mod common;

use common::{numbered_items, source, Script, ScriptedFetcher};
use feed_ingest::{InMemoryStore, Orchestrator, Pacer, RateLimiter, SweepOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn first_request_is_immediate_then_spaced() {
    let limiter = RateLimiter::new(Duration::from_secs(2));
    let start = Instant::now();

    limiter.wait().await;
    assert_eq!(start.elapsed(), Duration::ZERO);

    limiter.wait().await;
    limiter.wait().await;
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn no_wait_once_the_interval_has_passed() {
    let limiter = RateLimiter::new(Duration::from_secs(2));
    limiter.wait().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let before = Instant::now();
    limiter.wait().await;
    assert_eq!(before.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn sweep_spaces_feed_requests() {
    let sources = vec![
        source("a", "https://a.test/feed"),
        source("b", "https://b.test/feed"),
        source("c", "https://c.test/feed"),
    ];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with("https://a.test/feed", Script::Items(numbered_items("a", 1)))
            .with("https://b.test/feed", Script::Unreachable)
            .with("https://c.test/feed", Script::Items(numbered_items("c", 1))),
    );
    let store = Arc::new(InMemoryStore::with_sources(sources));
    let orch = Orchestrator::new(store, fetcher.clone(), Arc::new(RateLimiter::new(Duration::from_secs(2))));

    orch.run_sweep(&SweepOptions { concurrency: 3, ..SweepOptions::default() }).await.unwrap();

    let mut times = fetcher.call_times();
    times.sort();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(2));
    }
}
