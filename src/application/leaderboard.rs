//! Top-N counters for error messages and browsers, globally and per hour.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::ports::{CounterError, CounterStore};
use crate::domain::events::{ErrorEvent, leaderboard_member};
use crate::util::clock::Clock;
use crate::util::timestamp::{floor_to_hour, format_iso_millis};
use insights_api_types::{LeaderboardEntry, TopWidgetsResponse, WidgetScope};

pub const TOP_MESSAGES_KEY: &str = "errors:top:messages";
pub const TOP_BROWSERS_KEY: &str = "errors:top:browsers";
pub const DEFAULT_WIDGET_SIZE: usize = 5;
pub const MAX_WIDGET_SIZE: usize = 20;

/// `<base>:1h:<hour start>` for the hour containing `at`.
pub fn hourly_key(base: &str, at: OffsetDateTime) -> String {
    format!("{base}:1h:{}", format_iso_millis(floor_to_hour(at)))
}

/// Clamp a requested widget size into `[1, 20]`, defaulting to 5.
pub fn widget_size(requested: Option<i64>) -> usize {
    match requested {
        Some(value) => value.clamp(1, MAX_WIDGET_SIZE as i64) as usize,
        None => DEFAULT_WIDGET_SIZE,
    }
}

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error(transparent)]
    Counter(#[from] CounterError),
}

pub struct LeaderboardUpdater {
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    hourly_ttl_seconds: u64,
}

impl LeaderboardUpdater {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        hourly_ttl_seconds: u64,
    ) -> Self {
        Self {
            counters,
            clock,
            hourly_ttl_seconds,
        }
    }

    /// Add one point per event to its browser and message, in both scopes.
    pub async fn on_ingest(&self, events: &[ErrorEvent]) -> Result<(), LeaderboardError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tallies: BTreeMap<(&'static str, String), u64> = BTreeMap::new();
        for event in events {
            *tallies
                .entry((TOP_BROWSERS_KEY, leaderboard_member(event.browser.as_deref())))
                .or_default() += 1;
            *tallies
                .entry((
                    TOP_MESSAGES_KEY,
                    leaderboard_member(Some(event.error_message.as_str())),
                ))
                .or_default() += 1;
        }

        let now = self.clock.now();
        for ((base, member), amount) in tallies {
            let hourly = hourly_key(base, now);
            self.counters.increment(base, &member, amount).await?;
            self.counters.increment(&hourly, &member, amount).await?;
            self.counters
                .set_expiry(&hourly, self.hourly_ttl_seconds)
                .await?;
        }

        debug!(
            target = "insights::leaderboard",
            events = events.len(),
            "leaderboards updated"
        );
        Ok(())
    }
}

pub struct LeaderboardReader {
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl LeaderboardReader {
    pub fn new(counters: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { counters, clock }
    }

    pub async fn top(
        &self,
        scope: WidgetScope,
        size: usize,
    ) -> Result<TopWidgetsResponse, LeaderboardError> {
        let size = size.clamp(1, MAX_WIDGET_SIZE);
        let (messages_key, browsers_key) = match scope {
            WidgetScope::Global => (TOP_MESSAGES_KEY.to_string(), TOP_BROWSERS_KEY.to_string()),
            WidgetScope::LastHour => {
                let now = self.clock.now();
                (
                    hourly_key(TOP_MESSAGES_KEY, now),
                    hourly_key(TOP_BROWSERS_KEY, now),
                )
            }
        };

        let top_error_messages = to_entries(self.counters.top(&messages_key, size).await?);
        let top_browsers = to_entries(self.counters.top(&browsers_key, size).await?);

        Ok(TopWidgetsResponse {
            scope,
            top_error_messages,
            top_browsers,
        })
    }
}

fn to_entries(scores: Vec<(String, u64)>) -> Vec<LeaderboardEntry> {
    scores
        .into_iter()
        .map(|(key, count)| LeaderboardEntry { key, count })
        .collect()
}
