//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_LIVE_WINDOW_MS: u64 = 60_000;
const DEFAULT_LIVE_TTL_SECONDS: u64 = 5;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for results whose window ended outside the live window.
    pub ttl_seconds: u64,
    /// How far back from "now" a window end still counts as live.
    pub live_window: Duration,
    /// TTL for live results.
    pub live_ttl_seconds: u64,
    /// Maximum entries held by the in-memory store.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            live_window: Duration::from_millis(DEFAULT_LIVE_WINDOW_MS),
            live_ttl_seconds: DEFAULT_LIVE_TTL_SECONDS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl_seconds: settings.ttl_seconds.get(),
            live_window: settings.live_window,
            live_ttl_seconds: settings.live_ttl_seconds.get(),
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.live_window, Duration::from_secs(60));
        assert_eq!(config.live_ttl_seconds, 5);
        assert_eq!(config.memory_capacity, 1024);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }
}
