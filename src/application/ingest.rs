use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::info;

use crate::application::leaderboard::{LeaderboardError, LeaderboardUpdater};
use crate::application::ports::{EventIndexer, EventSink, SearchError, SinkError};
use crate::domain::events::ErrorEvent;
use insights_api_types::IngestResponse;

pub(crate) const METRIC_INGESTED_EVENTS: &str = "insights_ingest_events_total";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to store raw events: {0}")]
    Sink(#[from] SinkError),
    #[error("failed to index events: {0}")]
    Index(#[from] SearchError),
    #[error("failed to update leaderboards: {0}")]
    Leaderboard(#[from] LeaderboardError),
}

/// Raw store, then index, then leaderboards. The first failure aborts the batch.
pub struct IngestService {
    sink: Arc<dyn EventSink>,
    indexer: Arc<dyn EventIndexer>,
    leaderboard: Arc<LeaderboardUpdater>,
}

impl IngestService {
    pub fn new(
        sink: Arc<dyn EventSink>,
        indexer: Arc<dyn EventIndexer>,
        leaderboard: Arc<LeaderboardUpdater>,
    ) -> Self {
        Self {
            sink,
            indexer,
            leaderboard,
        }
    }

    pub async fn ingest(&self, events: &[ErrorEvent]) -> Result<IngestResponse, IngestError> {
        if events.is_empty() {
            return Ok(IngestResponse { ingested: 0 });
        }

        self.sink.save_raw(events).await?;
        self.indexer.bulk_index(events).await?;
        self.leaderboard.on_ingest(events).await?;

        counter!(METRIC_INGESTED_EVENTS).increment(events.len() as u64);
        info!(
            target = "insights::ingest",
            count = events.len(),
            "ingested error events"
        );

        Ok(IngestResponse {
            ingested: events.len(),
        })
    }
}
