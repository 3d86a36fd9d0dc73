//! Snapshot-backed cursor search ("load more").
//!
//! The first call opens a point-in-time snapshot and returns the first page plus a signed
//! cursor. Each following call decodes the cursor, reads the next page after its sort
//! tuple against the same snapshot, and re-issues a cursor. Once a short page marks the
//! session done the snapshot is released, so replaying any cursor of that session fails
//! as an invalid cursor instead of restarting from the top.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::pagination::{CursorCodec, PaginationError, SearchCursor};
use crate::application::ports::{SearchError, SearchPort, SnapshotFetch, SnapshotPage};
use crate::domain::filters::{NormalizedFilters, SearchFilters, SortOrder, normalize};
use insights_api_types::CursorSearchResponse;

#[derive(Debug, Error)]
pub enum CursorSearchError {
    #[error(transparent)]
    Cursor(#[from] PaginationError),
    #[error(transparent)]
    Search(#[from] SearchError),
}

#[derive(Clone)]
pub struct CursorSearchService {
    search: Arc<dyn SearchPort>,
    codec: CursorCodec,
    keep_alive: Duration,
}

impl CursorSearchService {
    pub fn new(search: Arc<dyn SearchPort>, codec: CursorCodec, keep_alive: Duration) -> Self {
        Self {
            search,
            codec,
            keep_alive,
        }
    }

    pub async fn search(
        &self,
        raw: &SearchFilters,
    ) -> Result<CursorSearchResponse, CursorSearchError> {
        let filters = normalize(raw);
        match filters.cursor.as_deref() {
            None => self.first_page(&filters).await,
            Some(token) => {
                let cursor = self.codec.decode(token)?;
                self.next_page(&filters, token, cursor).await
            }
        }
    }

    async fn first_page(
        &self,
        filters: &NormalizedFilters,
    ) -> Result<CursorSearchResponse, CursorSearchError> {
        let snapshot_id = self.search.open_snapshot(self.keep_alive).await?;
        debug!(target = "insights::cursor", snapshot_id, "opened snapshot");

        let fetch = SnapshotFetch {
            snapshot_id: &snapshot_id,
            keep_alive: self.keep_alive,
            size: filters.size,
            order: filters.sort,
            after: None,
            filters,
        };
        let page = match self.search.fetch_after(fetch).await {
            Ok(page) => page,
            Err(err) => {
                self.release(&snapshot_id).await;
                return Err(err.into());
            }
        };

        Ok(self
            .respond(snapshot_id, filters.size, filters.sort, None, page)
            .await)
    }

    async fn next_page(
        &self,
        filters: &NormalizedFilters,
        token: &str,
        cursor: SearchCursor,
    ) -> Result<CursorSearchResponse, CursorSearchError> {
        let fetch = SnapshotFetch {
            snapshot_id: cursor.pit_id(),
            keep_alive: self.keep_alive,
            size: cursor.size(),
            order: cursor.order(),
            after: Some(cursor.sort()),
            filters,
        };
        let page = self.search.fetch_after(fetch).await.map_err(|err| match err {
            SearchError::SnapshotExpired(id) => CursorSearchError::Cursor(
                PaginationError::InvalidCursor(format!("snapshot `{id}` is closed or expired")),
            ),
            other => CursorSearchError::Search(other),
        })?;

        Ok(self
            .respond(
                cursor.pit_id().to_string(),
                cursor.size(),
                cursor.order(),
                Some(token),
                page,
            )
            .await)
    }

    async fn respond(
        &self,
        snapshot_id: String,
        size: u32,
        order: SortOrder,
        previous: Option<&str>,
        page: SnapshotPage,
    ) -> CursorSearchResponse {
        let snapshot_id = page.snapshot_id.unwrap_or(snapshot_id);
        let done = page.items.len() < size as usize;
        let cursor = match page.last_sort {
            Some(sort) => Some(
                self.codec
                    .encode(&SearchCursor::new(snapshot_id.clone(), sort, size, order)),
            ),
            None => previous.map(str::to_string),
        };

        if done {
            self.release(&snapshot_id).await;
        }

        CursorSearchResponse {
            items: page.items,
            total: page.total,
            cursor,
            done,
        }
    }

    async fn release(&self, snapshot_id: &str) {
        match self.search.close_snapshot(snapshot_id).await {
            Ok(()) => debug!(target = "insights::cursor", snapshot_id, "closed snapshot"),
            Err(err) => warn!(
                target = "insights::cursor",
                snapshot_id,
                error = %err,
                "failed to close snapshot; it will lapse after its keep-alive"
            ),
        }
    }
}
