//! Cached offset search and stats.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::ports::{SearchError, SearchPage, SearchPort, StatsSummary};
use crate::cache::{
    CacheConfig, CacheNamespace, ResultCache, TtlPolicy, cache_key, end_minute_bucket,
};
use crate::domain::filters::{SearchFilters, normalize};
use crate::util::clock::Clock;
use insights_api_types::{CacheStatus, SearchResponse, StatsResponse};

#[derive(Debug, Error)]
pub enum SearchServiceError {
    #[error(transparent)]
    Search(#[from] SearchError),
}

#[derive(Clone)]
pub struct SearchService {
    search: Arc<dyn SearchPort>,
    cache: ResultCache,
    ttl: TtlPolicy,
    base_ttl_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl SearchService {
    pub fn new(
        search: Arc<dyn SearchPort>,
        cache: ResultCache,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            search,
            cache,
            ttl: TtlPolicy::from(config),
            base_ttl_seconds: config.ttl_seconds,
            clock,
        }
    }

    /// Offset-paged search. A cursor in the filters is ignored here.
    pub async fn search(&self, raw: &SearchFilters) -> Result<SearchResponse, SearchServiceError> {
        let filters = normalize(raw).without_cursor();
        let now = self.clock.now();
        let bucket = end_minute_bucket(filters.end.as_deref(), now);
        let key = cache_key(CacheNamespace::Search.prefix(), &filters, &bucket);

        if let Some(page) = self.cache.get::<SearchPage>(&key).await {
            return Ok(SearchResponse {
                items: page.items,
                total: page.total,
                cache: CacheStatus::Hit,
            });
        }

        let page = self.search.search(&filters).await?;
        let ttl = self
            .ttl
            .compute_ttl(self.base_ttl_seconds, filters.end.as_deref(), now);
        debug!(
            target = "insights::search",
            key,
            ttl,
            total = page.total,
            "caching search page"
        );
        self.cache.set(&key, &page, ttl).await;

        Ok(SearchResponse {
            items: page.items,
            total: page.total,
            cache: CacheStatus::Miss,
        })
    }

    /// Top browsers and error messages; paging and ordering do not apply.
    pub async fn stats(&self, raw: &SearchFilters) -> Result<StatsResponse, SearchServiceError> {
        let filters = normalize(raw).stats_filters();
        let now = self.clock.now();
        let bucket = end_minute_bucket(filters.end(), now);
        let key = cache_key(CacheNamespace::Stats.prefix(), &filters, &bucket);

        if let Some(summary) = self.cache.get::<StatsSummary>(&key).await {
            return Ok(StatsResponse {
                top_browsers: summary.top_browsers,
                top_error_messages: summary.top_error_messages,
                cache: CacheStatus::Hit,
            });
        }

        let summary = self.search.stats(&filters).await?;
        let ttl = self
            .ttl
            .compute_ttl(self.base_ttl_seconds, filters.end(), now);
        self.cache.set(&key, &summary, ttl).await;

        Ok(StatsResponse {
            top_browsers: summary.top_browsers,
            top_error_messages: summary.top_error_messages,
            cache: CacheStatus::Miss,
        })
    }
}
