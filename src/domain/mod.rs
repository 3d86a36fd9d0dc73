//! Domain layer: event records and search filter canonicalization.

pub mod events;
pub mod filters;
