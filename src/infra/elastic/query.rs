//! Request bodies for the Elasticsearch REST API.
//!
//! Structural filters (time range, user, browser, url) go into `bool.filter` and do not
//! affect scoring. The keyword is the only scored clause and goes into `bool.must`.

use serde_json::{Value, json};

use crate::application::pagination::{SortTuple, SortValue};
use crate::application::ports::SnapshotFetch;
use crate::domain::events::ErrorEvent;
use crate::domain::filters::{NormalizedFilters, StatsFilters};

const SOURCE_FIELDS: [&str; 6] = [
    "timestamp",
    "userId",
    "browser",
    "url",
    "errorMessage",
    "stackTrace",
];
const TEXT_FIELDS: [&str; 2] = ["errorMessage^2", "stackTrace"];
const STATS_BUCKETS: u32 = 5;
const MISSING_TERM: &str = "unknown";

pub(crate) fn bool_query(filters: &StatsFilters) -> Value {
    let mut filter = Vec::new();
    let mut must = Vec::new();

    if filters.start.is_some() || filters.end.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(start) = filters.start.as_deref() {
            range.insert("gte".into(), Value::from(start));
        }
        if let Some(end) = filters.end.as_deref() {
            range.insert("lte".into(), Value::from(end));
        }
        filter.push(json!({ "range": { "timestamp": range } }));
    }

    for (field, value) in [
        ("userId", filters.user_id.as_deref()),
        ("browser", filters.browser.as_deref()),
        ("url", filters.url.as_deref()),
    ] {
        if let Some(value) = value {
            filter.push(json!({
                "wildcard": {
                    field: {
                        "value": format!("*{}*", escape_wildcard(value)),
                        "case_insensitive": true,
                    }
                }
            }));
        }
    }

    if let Some(keyword) = filters.keyword.as_deref() {
        must.push(json!({
            "multi_match": {
                "query": keyword,
                "fields": TEXT_FIELDS,
                "type": "best_fields",
                "operator": "and",
                "fuzziness": "AUTO",
            }
        }));
        must.push(json!({
            "query_string": {
                "query": format!("{}*", escape_query_string(keyword)),
                "fields": TEXT_FIELDS,
                "default_operator": "AND",
            }
        }));
    }

    json!({ "bool": { "must": must, "filter": filter } })
}

pub(crate) fn search_body(filters: &NormalizedFilters) -> Value {
    json!({
        "from": filters.offset(),
        "size": filters.size,
        "sort": [{ "timestamp": { "order": filters.sort.as_str() } }],
        "track_total_hits": true,
        "query": bool_query(&filters.stats_filters()),
        "_source": SOURCE_FIELDS,
    })
}

pub(crate) fn stats_body(filters: &StatsFilters) -> Value {
    json!({
        "size": 0,
        "query": bool_query(filters),
        "aggs": {
            "topBrowsers": {
                "terms": { "field": "browser", "size": STATS_BUCKETS, "missing": MISSING_TERM }
            },
            "topErrorMessages": {
                "terms": {
                    "field": "errorMessage.keyword",
                    "size": STATS_BUCKETS,
                    "missing": MISSING_TERM,
                }
            },
        },
    })
}

/// Body for a search against an open point-in-time; no index goes in the path.
pub(crate) fn snapshot_body(fetch: &SnapshotFetch<'_>) -> Value {
    let order = fetch.order.as_str();
    let mut body = json!({
        "size": fetch.size,
        "track_total_hits": true,
        "query": bool_query(&fetch.filters.stats_filters()),
        "_source": SOURCE_FIELDS,
        "pit": { "id": fetch.snapshot_id, "keep_alive": keep_alive(fetch.keep_alive) },
        "sort": [
            { "timestamp": { "order": order } },
            { "_shard_doc": { "order": order } },
        ],
    });
    if let Some(after) = fetch.after {
        body["search_after"] = search_after(after);
    }
    body
}

pub(crate) fn keep_alive(duration: std::time::Duration) -> String {
    format!("{}s", duration.as_secs().max(1))
}

fn search_after(after: &SortTuple) -> Value {
    let primary = match after.value() {
        SortValue::Number(value) => Value::from(*value),
        SortValue::Text(value) => Value::from(value.as_str()),
    };
    let tiebreaker = after
        .tiebreaker()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(after.tiebreaker()));
    json!([primary, tiebreaker])
}

/// `[primary, tiebreaker]` from a hit's `sort` array.
pub(crate) fn sort_tuple(values: &[Value]) -> Option<SortTuple> {
    let [primary, tiebreaker] = values else {
        return None;
    };
    let primary = match primary {
        Value::Number(number) => SortValue::Number(number.as_i64()?),
        Value::String(text) => SortValue::Text(text.clone()),
        _ => return None,
    };
    let tiebreaker = match tiebreaker {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    Some(SortTuple::new(primary, tiebreaker))
}

pub(crate) fn index_mapping() -> Value {
    json!({
        "settings": { "number_of_shards": 1 },
        "mappings": {
            "properties": {
                "timestamp": { "type": "date" },
                "userId": { "type": "keyword" },
                "browser": { "type": "keyword" },
                "url": { "type": "keyword" },
                "errorMessage": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } },
                },
                "stackTrace": { "type": "text" },
            }
        }
    })
}

/// NDJSON body for `_bulk`: an action line followed by the document, per event.
pub(crate) fn bulk_body(index: &str, events: &[ErrorEvent]) -> String {
    let action = json!({ "index": { "_index": index } }).to_string();
    let mut body = String::new();
    for event in events {
        body.push_str(&action);
        body.push('\n');
        body.push_str(
            &serde_json::to_string(event).expect("serializing error event should succeed"),
        );
        body.push('\n');
    }
    body
}

fn escape_wildcard(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn escape_query_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            // cannot be escaped in query_string syntax
            '<' | '>' => continue,
            '+' | '-' | '=' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"'
            | '~' | '*' | '?' | ':' | '\\' | '/' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}
