//! Cache lifetime for a query, from how recent its window end is.

use std::time::Duration;

use time::OffsetDateTime;

use crate::util::timestamp::{parse_instant, unix_millis};

use super::config::CacheConfig;

/// Chooses between the short live TTL and a base TTL from the query window end.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    live_window: Duration,
    live_ttl_seconds: u64,
}

impl TtlPolicy {
    pub fn new(live_window: Duration, live_ttl_seconds: u64) -> Self {
        Self {
            live_window,
            live_ttl_seconds,
        }
    }

    /// Absent or unparseable `end` is treated as `now`; a future `end` is live.
    pub fn compute_ttl(
        &self,
        base_ttl_seconds: u64,
        end: Option<&str>,
        now: OffsetDateTime,
    ) -> u64 {
        let end = end.and_then(parse_instant).unwrap_or(now);
        let age_ms = i128::from(unix_millis(now)) - i128::from(unix_millis(end));
        if age_ms <= self.live_window.as_millis() as i128 {
            self.live_ttl_seconds
        } else {
            base_ttl_seconds
        }
    }
}

impl From<&CacheConfig> for TtlPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self::new(config.live_window, config.live_ttl_seconds)
    }
}
