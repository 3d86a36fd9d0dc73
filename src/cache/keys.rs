//! Cache key derivation.

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::util::timestamp::{floor_to_minute, format_iso_millis, parse_instant};

/// Namespace prefix separating use cases that share a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    Search,
    Stats,
}

impl CacheNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Search => "search",
            CacheNamespace::Stats => "stats",
        }
    }
}

/// The window end rounded down to the minute, or the current minute when absent.
pub fn end_minute_bucket(end: Option<&str>, now: OffsetDateTime) -> String {
    let instant = end.and_then(parse_instant).unwrap_or(now);
    format_iso_millis(floor_to_minute(instant))
}

/// `"{prefix}:{sha256 hex}"` over the canonical JSON of `{filters, endBucket}`.
pub fn cache_key<T: Serialize>(prefix: &str, filters: &T, end_bucket: &str) -> String {
    let filters =
        serde_json::to_value(filters).expect("serializing cache key filters should succeed");
    let payload = json!({ "filters": filters, "endBucket": end_bucket });
    let digest = Sha256::digest(canonical_json(&payload).as_bytes());
    format!("{prefix}:{}", hex::encode(digest))
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (index, (key, child)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, child) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(child, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filters::{SearchFilters, normalize};
    use time::macros::datetime;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({ "b": 1, "a": { "z": [ { "y": 2, "x": 1 } ], "c": null } });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":null,"z":[{"x":1,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn bucket_uses_end_when_present() {
        let now = datetime!(2024-05-01 12:00:30 UTC);
        assert_eq!(
            end_minute_bucket(Some("2024-05-01T09:15:59.999Z"), now),
            "2024-05-01T09:15:00.000Z"
        );
        assert_eq!(end_minute_bucket(None, now), "2024-05-01T12:00:00.000Z");
        assert_eq!(
            end_minute_bucket(Some("garbage"), now),
            "2024-05-01T12:00:00.000Z"
        );
    }

    #[test]
    fn equivalent_filters_share_a_key() {
        let a = normalize(&SearchFilters {
            browser: Some("Chrome ".into()),
            start: Some("2024-05-01T10:00:12Z".into()),
            ..Default::default()
        });
        let b = normalize(&SearchFilters {
            browser: Some("chrome".into()),
            start: Some("2024-05-01T10:00:59.5Z".into()),
            ..Default::default()
        });
        let bucket = "2024-05-01T12:00:00.000Z";

        let key_a = cache_key(CacheNamespace::Search.prefix(), &a, bucket);
        let key_b = cache_key(CacheNamespace::Search.prefix(), &b, bucket);
        assert_eq!(key_a, key_b);
        assert!(key_a.starts_with("search:"));
        assert_eq!(key_a.len(), "search:".len() + 64);
    }

    #[test]
    fn key_is_deterministic_and_namespaced() {
        let filters = normalize(&SearchFilters::default());
        let bucket = "2024-05-01T12:00:00.000Z";

        let first = cache_key("stats", &filters, bucket);
        let second = cache_key("stats", &filters, bucket);
        assert_eq!(first, second);
        assert_ne!(first, cache_key("search", &filters, bucket));
    }

    #[test]
    fn different_buckets_produce_different_keys() {
        let filters = normalize(&SearchFilters::default());
        assert_ne!(
            cache_key("search", &filters, "2024-05-01T12:00:00.000Z"),
            cache_key("search", &filters, "2024-05-01T12:01:00.000Z"),
        );
    }
}
