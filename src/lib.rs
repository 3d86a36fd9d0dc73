//! Error event search, cursor pagination and leaderboards over a pluggable search engine.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
