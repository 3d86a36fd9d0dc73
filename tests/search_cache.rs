//! Cached search and stats against a counting search port.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::datetime;

use insights::application::ports::{
    CacheStore, CacheStoreError, SearchError, SearchPage, SearchPort, SnapshotFetch, SnapshotPage,
    StatsSummary,
};
use insights::application::search::{SearchService, SearchServiceError};
use insights::cache::{CacheConfig, MemoryCacheStore, ResultCache};
use insights::domain::events::{EventItem, TermBucket};
use insights::domain::filters::{NormalizedFilters, SearchFilters, StatsFilters};
use insights::util::clock::{Clock, ManualClock};
use insights_api_types::CacheStatus;

#[derive(Default)]
struct CountingPort {
    searches: AtomicUsize,
    stats: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl SearchPort for CountingPort {
    async fn search(&self, filters: &NormalizedFilters) -> Result<SearchPage, SearchError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::Engine {
                status: 503,
                message: "cluster red".into(),
            });
        }
        Ok(SearchPage {
            items: vec![EventItem {
                id: format!("doc-{}", filters.page),
                timestamp: "2024-05-01T10:00:00Z".into(),
                user_id: Some("u1".into()),
                browser: filters.browser.clone(),
                url: None,
                error_message: "TypeError".into(),
                stack_trace: None,
            }],
            total: 1,
        })
    }

    async fn stats(&self, _filters: &StatsFilters) -> Result<StatsSummary, SearchError> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        Ok(StatsSummary {
            top_browsers: vec![TermBucket {
                key: "chrome".into(),
                doc_count: 4,
            }],
            top_error_messages: Vec::new(),
        })
    }

    async fn open_snapshot(&self, _keep_alive: Duration) -> Result<String, SearchError> {
        unreachable!("offset search never opens snapshots")
    }

    async fn close_snapshot(&self, _snapshot_id: &str) -> Result<(), SearchError> {
        unreachable!("offset search never closes snapshots")
    }

    async fn fetch_after(&self, _request: SnapshotFetch<'_>) -> Result<SnapshotPage, SearchError> {
        unreachable!("offset search never reads snapshots")
    }
}

struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheStoreError> {
        Err(CacheStoreError::unavailable("connection reset"))
    }

    async fn set(
        &self,
        _key: &str,
        _value: String,
        _ttl_seconds: u64,
    ) -> Result<(), CacheStoreError> {
        Err(CacheStoreError::unavailable("connection reset"))
    }
}

/// Forwards to an in-memory store and remembers the TTL of every write.
#[derive(Default)]
struct TtlRecorder {
    inner: MemoryCacheStore,
    ttls: Mutex<Vec<u64>>,
}

impl TtlRecorder {
    fn ttls(&self) -> Vec<u64> {
        self.ttls.lock().expect("ttl lock").clone()
    }
}

#[async_trait]
impl CacheStore for TtlRecorder {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheStoreError> {
        self.ttls.lock().expect("ttl lock").push(ttl_seconds);
        self.inner.set(key, value, ttl_seconds).await
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(datetime!(2024-05-01 12:00:00 UTC)))
}

fn service(port: Arc<CountingPort>, store: Arc<dyn CacheStore>) -> SearchService {
    service_at(port, store, clock())
}

fn service_at(
    port: Arc<CountingPort>,
    store: Arc<dyn CacheStore>,
    clock: Arc<ManualClock>,
) -> SearchService {
    let clock: Arc<dyn Clock> = clock;
    SearchService::new(
        port,
        ResultCache::new(store),
        &CacheConfig::default(),
        clock,
    )
}

fn chrome_filters() -> SearchFilters {
    SearchFilters {
        browser: Some("Chrome".into()),
        start: Some("2024-05-01T10:00:00Z".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn second_identical_search_is_a_hit() {
    let port = Arc::new(CountingPort::default());
    let service = service(port.clone(), Arc::new(MemoryCacheStore::default()));

    let first = service.search(&chrome_filters()).await.expect("first search");
    let second = service.search(&chrome_filters()).await.expect("second search");

    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(first.items, second.items);
    assert_eq!(port.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn equivalent_filters_share_an_entry() {
    let port = Arc::new(CountingPort::default());
    let service = service(port.clone(), Arc::new(MemoryCacheStore::default()));

    service.search(&chrome_filters()).await.expect("first search");
    let respelled = SearchFilters {
        browser: Some("  chrome ".into()),
        start: Some("2024-05-01T10:00:42.917Z".into()),
        ..Default::default()
    };
    let response = service.search(&respelled).await.expect("second search");

    assert_eq!(response.cache, CacheStatus::Hit);
    assert_eq!(port.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn changed_filter_forces_a_miss() {
    let port = Arc::new(CountingPort::default());
    let service = service(port.clone(), Arc::new(MemoryCacheStore::default()));

    service.search(&chrome_filters()).await.expect("first search");
    let next_page = SearchFilters {
        page: Some(2),
        ..chrome_filters()
    };
    let response = service.search(&next_page).await.expect("second search");

    assert_eq!(response.cache, CacheStatus::Miss);
    assert_eq!(port.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stats_ignore_paging_when_keying() {
    let port = Arc::new(CountingPort::default());
    let service = service(port.clone(), Arc::new(MemoryCacheStore::default()));

    let first = service.stats(&chrome_filters()).await.expect("stats");
    let paged = SearchFilters {
        page: Some(7),
        size: Some(10),
        sort: Some("asc".into()),
        ..chrome_filters()
    };
    let second = service.stats(&paged).await.expect("stats");

    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.top_browsers[0].key, "chrome");
    assert_eq!(port.stats.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_outage_degrades_to_miss() {
    let port = Arc::new(CountingPort::default());
    let service = service(port.clone(), Arc::new(BrokenStore));

    let first = service.search(&chrome_filters()).await.expect("served");
    let second = service.search(&chrome_filters()).await.expect("served");

    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(second.cache, CacheStatus::Miss);
    assert_eq!(port.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn engine_errors_propagate_and_are_not_cached() {
    let port = Arc::new(CountingPort {
        fail: true,
        ..Default::default()
    });
    let service = service(port.clone(), Arc::new(MemoryCacheStore::default()));

    for _ in 0..2 {
        let err = service
            .search(&chrome_filters())
            .await
            .expect_err("engine failure");
        assert!(matches!(
            err,
            SearchServiceError::Search(SearchError::Engine { status: 503, .. })
        ));
    }
    assert_eq!(port.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn open_ended_query_misses_after_the_minute_rolls_over() {
    let port = Arc::new(CountingPort::default());
    let store = Arc::new(TtlRecorder::default());
    let clock = clock();
    let service = service_at(port.clone(), store.clone(), clock.clone());

    let first = service.search(&chrome_filters()).await.expect("first search");
    let same_minute = service.search(&chrome_filters()).await.expect("same minute");
    clock.advance(time::Duration::seconds(60));
    let next_minute = service.search(&chrome_filters()).await.expect("next minute");

    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(same_minute.cache, CacheStatus::Hit);
    assert_eq!(next_minute.cache, CacheStatus::Miss);
    assert_eq!(store.ttls(), vec![5, 5]);
    assert_eq!(port.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn historical_window_keeps_the_base_ttl() {
    let port = Arc::new(CountingPort::default());
    let store = Arc::new(TtlRecorder::default());
    let clock = clock();
    let service = service_at(port.clone(), store.clone(), clock.clone());
    let historical = SearchFilters {
        end: Some("2024-05-01T10:00:00Z".into()),
        ..chrome_filters()
    };

    let first = service.search(&historical).await.expect("first search");
    clock.advance(time::Duration::seconds(10));
    let later = service.search(&historical).await.expect("later search");
    clock.advance(time::Duration::seconds(120));
    let much_later = service.search(&historical).await.expect("much later");

    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(later.cache, CacheStatus::Hit);
    assert_eq!(much_later.cache, CacheStatus::Hit);
    assert_eq!(store.ttls(), vec![60]);
    assert_eq!(port.searches.load(Ordering::SeqCst), 1);
}
