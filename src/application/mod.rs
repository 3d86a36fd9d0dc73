//! Application services: cached search, cursor pagination, ingest and leaderboards.

pub mod cursor;
pub mod error;
pub mod ingest;
pub mod leaderboard;
pub mod pagination;
pub mod ports;
pub mod search;
