use std::sync::Arc;
use std::time::Duration;

use time::macros::datetime;

use insights::application::leaderboard::{
    LeaderboardReader, LeaderboardUpdater, TOP_BROWSERS_KEY, TOP_MESSAGES_KEY, hourly_key,
};
use insights::domain::events::ErrorEvent;
use insights::infra::memory::MemoryCounterStore;
use insights::util::clock::ManualClock;
use insights_api_types::WidgetScope;

const HOURLY_TTL: u64 = 7200;

fn event(browser: Option<&str>, message: &str) -> ErrorEvent {
    ErrorEvent {
        timestamp: "2024-05-01T10:15:00Z".into(),
        user_id: "u1".into(),
        browser: browser.map(str::to_string),
        url: None,
        error_message: message.into(),
        stack_trace: None,
    }
}

fn fixtures() -> (Arc<MemoryCounterStore>, Arc<ManualClock>) {
    (
        Arc::new(MemoryCounterStore::new()),
        Arc::new(ManualClock::new(datetime!(2024-05-01 10:42:00 UTC))),
    )
}

#[tokio::test]
async fn browsers_are_counted_case_insensitively() {
    let (counters, clock) = fixtures();
    let updater = LeaderboardUpdater::new(counters.clone(), clock, HOURLY_TTL);

    updater
        .on_ingest(&[
            event(Some("chrome"), "TypeError"),
            event(Some("Chrome"), "TypeError"),
            event(Some("firefox"), "ReferenceError"),
        ])
        .await
        .expect("update leaderboards");

    let hourly = hourly_key(TOP_BROWSERS_KEY, datetime!(2024-05-01 10:42:00 UTC));
    assert_eq!(hourly, "errors:top:browsers:1h:2024-05-01T10:00:00.000Z");

    for key in [TOP_BROWSERS_KEY, hourly.as_str()] {
        assert_eq!(counters.score(key, "chrome"), Some(2));
        assert_eq!(counters.score(key, "firefox"), Some(1));
    }
    assert_eq!(counters.score(TOP_MESSAGES_KEY, "typeerror"), Some(2));
    let remaining = counters.expiry(&hourly).expect("hourly key expires");
    assert!(remaining <= Duration::from_secs(HOURLY_TTL));
    assert!(remaining > Duration::from_secs(HOURLY_TTL - 60));
    assert_eq!(counters.expiry(TOP_BROWSERS_KEY), None);
}

#[tokio::test]
async fn missing_browser_counts_as_unknown() {
    let (counters, clock) = fixtures();
    let updater = LeaderboardUpdater::new(counters.clone(), clock, HOURLY_TTL);

    updater
        .on_ingest(&[event(None, "boom"), event(Some("   "), "boom")])
        .await
        .expect("update leaderboards");

    assert_eq!(counters.score(TOP_BROWSERS_KEY, "unknown"), Some(2));
}

#[tokio::test]
async fn reader_returns_best_first_per_scope() {
    let (counters, clock) = fixtures();
    let updater = LeaderboardUpdater::new(counters.clone(), clock.clone(), HOURLY_TTL);
    let reader = LeaderboardReader::new(counters, clock.clone());

    updater
        .on_ingest(&[
            event(Some("safari"), "a"),
            event(Some("chrome"), "a"),
            event(Some("chrome"), "b"),
        ])
        .await
        .expect("first hour");

    clock.advance(time::Duration::seconds(3600));
    updater
        .on_ingest(&[event(Some("firefox"), "c")])
        .await
        .expect("second hour");

    let global = reader.top(WidgetScope::Global, 2).await.expect("global");
    assert_eq!(global.scope, WidgetScope::Global);
    assert_eq!(global.top_browsers.len(), 2);
    assert_eq!(global.top_browsers[0].key, "chrome");
    assert_eq!(global.top_browsers[0].count, 2);
    assert_eq!(global.top_error_messages[0].key, "a");

    let hour = reader.top(WidgetScope::LastHour, 5).await.expect("last hour");
    assert_eq!(hour.top_browsers.len(), 1);
    assert_eq!(hour.top_browsers[0].key, "firefox");
    assert_eq!(hour.top_error_messages[0].key, "c");
}

#[tokio::test]
async fn empty_batch_touches_nothing() {
    let (counters, clock) = fixtures();
    let updater = LeaderboardUpdater::new(counters.clone(), clock, HOURLY_TTL);

    updater.on_ingest(&[]).await.expect("no-op");
    assert_eq!(counters.score(TOP_BROWSERS_KEY, "unknown"), None);
}
