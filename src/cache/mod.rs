//! Result cache for search and stats responses.
//!
//! Keys are derived from canonical filters plus an end-minute bucket, so equal queries
//! issued within the same minute share an entry. Entries whose time window touches the
//! last minute ("live" queries) get a short TTL; historical windows get the base TTL.
//!
//! ```toml
//! [cache]
//! ttl_seconds = 60
//! live_window_ms = 60000
//! live_ttl_seconds = 5
//! memory_capacity = 1024
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod store;
mod ttl;

pub use config::CacheConfig;
pub use keys::{CacheNamespace, cache_key, canonical_json, end_minute_bucket};
pub use store::{MemoryCacheStore, ResultCache};
pub use ttl::TtlPolicy;
