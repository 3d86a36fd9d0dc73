//! Port traits describing the external collaborators: search engine, cache store,
//! counter store, raw event sink and indexer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::pagination::SortTuple;
use crate::domain::events::{ErrorEvent, EventItem, TermBucket};
use crate::domain::filters::{NormalizedFilters, SortOrder, StatsFilters};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search engine request failed: {0}")]
    Transport(String),
    #[error("search engine returned status {status}: {message}")]
    Engine { status: u16, message: String },
    #[error("point-in-time snapshot `{0}` is missing or expired")]
    SnapshotExpired(String),
    #[error("unexpected search engine response: {0}")]
    Decode(String),
}

impl SearchError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// One page of an offset search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<EventItem>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub top_browsers: Vec<TermBucket>,
    pub top_error_messages: Vec<TermBucket>,
}

/// A bounded read against an open point-in-time snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFetch<'a> {
    pub snapshot_id: &'a str,
    pub keep_alive: Duration,
    pub size: u32,
    pub order: SortOrder,
    pub after: Option<&'a SortTuple>,
    pub filters: &'a NormalizedFilters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPage {
    pub items: Vec<EventItem>,
    pub total: u64,
    /// Sort tuple of the last returned row, `None` when the page is empty.
    pub last_sort: Option<SortTuple>,
    /// Engines may hand back a refreshed snapshot id on every read.
    pub snapshot_id: Option<String>,
}

#[async_trait]
pub trait SearchPort: Send + Sync {
    async fn search(&self, filters: &NormalizedFilters) -> Result<SearchPage, SearchError>;

    async fn stats(&self, filters: &StatsFilters) -> Result<StatsSummary, SearchError>;

    async fn open_snapshot(&self, keep_alive: Duration) -> Result<String, SearchError>;

    async fn close_snapshot(&self, snapshot_id: &str) -> Result<(), SearchError>;

    async fn fetch_after(&self, request: SnapshotFetch<'_>) -> Result<SnapshotPage, SearchError>;
}

#[async_trait]
pub trait EventIndexer: Send + Sync {
    async fn bulk_index(&self, events: &[ErrorEvent]) -> Result<(), SearchError>;
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

impl CacheStoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Key-value store holding serialized results with a per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    async fn set(&self, key: &str, value: String, ttl_seconds: u64)
    -> Result<(), CacheStoreError>;
}

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

impl CounterError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Sorted-set style score store backing the leaderboards.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, member: &str, amount: u64) -> Result<(), CounterError>;

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<(), CounterError>;

    /// Highest-scoring members, best first.
    async fn top(&self, key: &str, limit: usize) -> Result<Vec<(String, u64)>, CounterError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable store for raw ingested events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn save_raw(&self, events: &[ErrorEvent]) -> Result<(), SinkError>;
}
