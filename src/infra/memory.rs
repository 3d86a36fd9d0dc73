//! In-process adapters for every port.
//!
//! They are the default backend when no Elasticsearch or Redis is configured and back the
//! integration tests. Matching mirrors the Elasticsearch adapter loosely: structural
//! filters are case-insensitive substring matches, the keyword is a case-insensitive
//! substring match on message or stack trace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{SortTuple, SortValue};
use crate::application::ports::{
    CounterError, CounterStore, EventIndexer, EventSink, SearchError, SearchPage, SearchPort,
    SinkError, SnapshotFetch, SnapshotPage, StatsSummary,
};
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::domain::events::{ErrorEvent, EventItem, TermBucket, UNKNOWN_MEMBER};
use crate::domain::filters::{NormalizedFilters, SortOrder, StatsFilters};
use crate::util::timestamp::{parse_instant, unix_millis};

const SOURCE: &str = "infra::memory";
const STATS_BUCKETS: usize = 5;

#[derive(Debug, Clone)]
struct StoredEvent {
    id: String,
    millis: i64,
    at: OffsetDateTime,
    event: ErrorEvent,
}

impl StoredEvent {
    fn sort_key(&self) -> (SortValue, &str) {
        (SortValue::Number(self.millis), self.id.as_str())
    }

    fn sort_tuple(&self) -> SortTuple {
        SortTuple::new(SortValue::Number(self.millis), self.id.clone())
    }

    fn to_item(&self) -> EventItem {
        EventItem {
            id: self.id.clone(),
            timestamp: self.event.timestamp.clone(),
            user_id: Some(self.event.user_id.clone()),
            browser: self.event.browser.clone(),
            url: self.event.url.clone(),
            error_message: self.event.error_message.clone(),
            stack_trace: self.event.stack_trace.clone(),
        }
    }

    fn matches(&self, filters: &StatsFilters) -> bool {
        let within_start = filters
            .start
            .as_deref()
            .and_then(parse_instant)
            .is_none_or(|start| self.at >= start);
        let within_end = filters
            .end
            .as_deref()
            .and_then(parse_instant)
            .is_none_or(|end| self.at <= end);

        within_start
            && within_end
            && contains(Some(self.event.user_id.as_str()), filters.user_id.as_deref())
            && contains(self.event.browser.as_deref(), filters.browser.as_deref())
            && contains(self.event.url.as_deref(), filters.url.as_deref())
            && self.matches_keyword(filters.keyword.as_deref())
    }

    fn matches_keyword(&self, keyword: Option<&str>) -> bool {
        let Some(keyword) = keyword else {
            return true;
        };
        let keyword = keyword.to_lowercase();
        self.event.error_message.to_lowercase().contains(&keyword)
            || self
                .event
                .stack_trace
                .as_deref()
                .is_some_and(|trace| trace.to_lowercase().contains(&keyword))
    }
}

fn contains(haystack: Option<&str>, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(needle) => haystack.is_some_and(|value| value.to_lowercase().contains(needle)),
    }
}

fn sorted(mut rows: Vec<StoredEvent>, order: SortOrder) -> Vec<StoredEvent> {
    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    if order == SortOrder::Desc {
        rows.reverse();
    }
    rows
}

struct Snapshot {
    rows: Arc<Vec<StoredEvent>>,
    expires_at: Instant,
}

/// Search engine over an in-memory event list with point-in-time snapshots.
#[derive(Default)]
pub struct MemorySearchEngine {
    events: RwLock<Vec<StoredEvent>>,
    snapshots: DashMap<String, Snapshot>,
}

impl MemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots currently open.
    pub fn open_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    fn filtered(&self, rows: &[StoredEvent], filters: &StatsFilters) -> Vec<StoredEvent> {
        rows.iter()
            .filter(|row| row.matches(filters))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SearchPort for MemorySearchEngine {
    async fn search(&self, filters: &NormalizedFilters) -> Result<SearchPage, SearchError> {
        let rows = {
            let events = rw_read(&self.events, SOURCE, "search");
            self.filtered(&events, &filters.stats_filters())
        };
        let total = rows.len() as u64;
        let offset = usize::try_from(filters.offset()).unwrap_or(usize::MAX);
        let items = sorted(rows, filters.sort)
            .iter()
            .skip(offset)
            .take(filters.size as usize)
            .map(StoredEvent::to_item)
            .collect();

        Ok(SearchPage { items, total })
    }

    async fn stats(&self, filters: &StatsFilters) -> Result<StatsSummary, SearchError> {
        let rows = {
            let events = rw_read(&self.events, SOURCE, "stats");
            self.filtered(&events, filters)
        };

        let top_browsers = top_terms(rows.iter().map(|row| {
            row.event
                .browser
                .clone()
                .unwrap_or_else(|| UNKNOWN_MEMBER.to_string())
        }));
        let top_error_messages =
            top_terms(rows.iter().map(|row| row.event.error_message.clone()));

        Ok(StatsSummary {
            top_browsers,
            top_error_messages,
        })
    }

    async fn open_snapshot(&self, keep_alive: Duration) -> Result<String, SearchError> {
        let now = Instant::now();
        // Abandoned sessions never come back to close their snapshot.
        self.snapshots.retain(|_, snapshot| snapshot.expires_at > now);

        let rows = rw_read(&self.events, SOURCE, "open_snapshot").clone();
        let id = Uuid::new_v4().to_string();
        self.snapshots.insert(
            id.clone(),
            Snapshot {
                rows: Arc::new(rows),
                expires_at: now + keep_alive,
            },
        );
        Ok(id)
    }

    async fn close_snapshot(&self, snapshot_id: &str) -> Result<(), SearchError> {
        self.snapshots.remove(snapshot_id);
        Ok(())
    }

    async fn fetch_after(&self, request: SnapshotFetch<'_>) -> Result<SnapshotPage, SearchError> {
        let now = Instant::now();
        let live_rows = {
            let entry = self.snapshots.get_mut(request.snapshot_id);
            match entry {
                Some(mut snapshot) if snapshot.expires_at > now => {
                    snapshot.expires_at = now + request.keep_alive;
                    Some(Arc::clone(&snapshot.rows))
                }
                _ => None,
            }
        };
        let Some(rows) = live_rows else {
            // Shard guard is released by now.
            self.snapshots.remove(request.snapshot_id);
            return Err(SearchError::SnapshotExpired(
                request.snapshot_id.to_string(),
            ));
        };

        let matching = sorted(
            self.filtered(&rows, &request.filters.stats_filters()),
            request.order,
        );
        let total = matching.len() as u64;

        let page: Vec<&StoredEvent> = matching
            .iter()
            .filter(|row| match request.after {
                None => true,
                Some(after) => {
                    let after_key = (after.value().clone(), after.tiebreaker());
                    match request.order {
                        SortOrder::Asc => row.sort_key() > after_key,
                        SortOrder::Desc => row.sort_key() < after_key,
                    }
                }
            })
            .take(request.size as usize)
            .collect();

        Ok(SnapshotPage {
            items: page.iter().map(|row| row.to_item()).collect(),
            total,
            last_sort: page.last().map(|row| row.sort_tuple()),
            snapshot_id: None,
        })
    }
}

#[async_trait]
impl EventIndexer for MemorySearchEngine {
    async fn bulk_index(&self, events: &[ErrorEvent]) -> Result<(), SearchError> {
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            let at = parse_instant(&event.timestamp).ok_or_else(|| SearchError::Engine {
                status: 400,
                message: format!("unparseable timestamp `{}`", event.timestamp),
            })?;
            stored.push(StoredEvent {
                id: Uuid::new_v4().to_string(),
                millis: unix_millis(at),
                at,
                event: event.clone(),
            });
        }
        rw_write(&self.events, SOURCE, "bulk_index").extend(stored);
        Ok(())
    }
}

fn top_terms(values: impl Iterator<Item = String>) -> Vec<TermBucket> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut buckets: Vec<TermBucket> = counts
        .into_iter()
        .map(|(key, doc_count)| TermBucket { key, doc_count })
        .collect();
    buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
    buckets.truncate(STATS_BUCKETS);
    buckets
}

#[derive(Default)]
struct ScoreSet {
    scores: HashMap<String, u64>,
    expires_at: Option<Instant>,
}

impl ScoreSet {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Drops keys whose expiry has passed; past hourly buckets are never written again.
fn purge_expired(sets: &mut HashMap<String, ScoreSet>, now: Instant) {
    sets.retain(|_, set| !set.is_expired(now));
}

/// Sorted-set counters with optional per-key expiry.
#[derive(Default)]
pub struct MemoryCounterStore {
    sets: RwLock<HashMap<String, ScoreSet>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, key: &str, member: &str) -> Option<u64> {
        let sets = rw_read(&self.sets, SOURCE, "score");
        sets.get(key)
            .filter(|set| !set.is_expired(Instant::now()))
            .and_then(|set| set.scores.get(member).copied())
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.sets, SOURCE, "key_count").len()
    }

    /// Remaining lifetime of a key, if one was set.
    pub fn expiry(&self, key: &str) -> Option<Duration> {
        let sets = rw_read(&self.sets, SOURCE, "expiry");
        sets.get(key)
            .and_then(|set| set.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, member: &str, amount: u64) -> Result<(), CounterError> {
        let now = Instant::now();
        let mut sets = rw_write(&self.sets, SOURCE, "increment");
        purge_expired(&mut sets, now);
        let set = sets.entry(key.to_string()).or_default();
        *set.scores.entry(member.to_string()).or_default() += amount;
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<(), CounterError> {
        let now = Instant::now();
        let mut sets = rw_write(&self.sets, SOURCE, "set_expiry");
        purge_expired(&mut sets, now);
        if let Some(set) = sets.get_mut(key) {
            set.expires_at = Some(now + Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn top(&self, key: &str, limit: usize) -> Result<Vec<(String, u64)>, CounterError> {
        let sets = rw_read(&self.sets, SOURCE, "top");
        let Some(set) = sets.get(key).filter(|set| !set.is_expired(Instant::now())) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(String, u64)> = set
            .scores
            .iter()
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Append-only raw event log.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ErrorEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ErrorEvent> {
        mutex_lock(&self.events, SOURCE, "events").clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn save_raw(&self, events: &[ErrorEvent]) -> Result<(), SinkError> {
        mutex_lock(&self.events, SOURCE, "save_raw").extend_from_slice(events);
        Ok(())
    }
}
