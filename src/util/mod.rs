//! Small helpers shared across layers.

pub mod clock;
pub mod timestamp;
