//! Event records shared with the wire contract.

pub use insights_api_types::{ErrorEvent, EventItem, TermBucket};

/// Member used when an event lacks a value for a ranked dimension.
pub const UNKNOWN_MEMBER: &str = "unknown";

/// Lower-cased, trimmed leaderboard member for an optional event field.
pub fn leaderboard_member(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| UNKNOWN_MEMBER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_are_case_folded() {
        assert_eq!(leaderboard_member(Some(" Chrome ")), "chrome");
        assert_eq!(leaderboard_member(Some("")), UNKNOWN_MEMBER);
        assert_eq!(leaderboard_member(None), UNKNOWN_MEMBER);
    }
}
