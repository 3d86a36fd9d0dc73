//! Query and body shapes accepted at the HTTP boundary, and their validation.
//!
//! Every query field arrives as an optional string. Empty strings count as absent, so
//! `?browser=&page=` is the same request as no parameters at all.

use serde::Deserialize;

use crate::application::leaderboard::widget_size;
use crate::domain::events::ErrorEvent;
use crate::domain::filters::{MAX_PAGE_SIZE, SearchFilters};
use crate::util::timestamp::parse_instant;
use insights_api_types::WidgetScope;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FiltersQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub user_id: Option<String>,
    pub browser: Option<String>,
    pub url: Option<String>,
    pub keyword: Option<String>,
    pub q: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WidgetsQuery {
    pub scope: Option<String>,
    pub size: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn instant(field: &str, value: Option<String>) -> Result<Option<String>, String> {
    match present(value) {
        Some(value) if parse_instant(value.trim()).is_none() => {
            Err(format!("`{field}` must be an RFC 3339 timestamp"))
        }
        other => Ok(other),
    }
}

fn integer(field: &str, value: Option<String>) -> Result<Option<i64>, String> {
    present(value)
        .map(|value| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("`{field}` must be an integer"))
        })
        .transpose()
}

impl FiltersQuery {
    pub fn validate(self) -> Result<SearchFilters, String> {
        let page = integer("page", self.page)?;
        if page.is_some_and(|page| page < 1) {
            return Err("`page` must be at least 1".to_string());
        }

        let size = integer("size", self.size)?;
        if size.is_some_and(|size| !(1..=i64::from(MAX_PAGE_SIZE)).contains(&size)) {
            return Err(format!("`size` must be between 1 and {MAX_PAGE_SIZE}"));
        }

        let sort = present(self.sort);
        if let Some(sort) = sort.as_deref() {
            let sort = sort.trim();
            if !sort.eq_ignore_ascii_case("asc") && !sort.eq_ignore_ascii_case("desc") {
                return Err("`sort` must be `asc` or `desc`".to_string());
            }
        }

        Ok(SearchFilters {
            start: instant("start", self.start)?,
            end: instant("end", self.end)?,
            user_id: present(self.user_id),
            browser: present(self.browser),
            url: present(self.url),
            keyword: present(self.keyword).or(present(self.q)),
            page,
            size,
            sort,
            cursor: present(self.cursor),
        })
    }
}

impl WidgetsQuery {
    pub fn validate(self) -> Result<(WidgetScope, usize), String> {
        let scope = match present(self.scope).as_deref().map(str::trim) {
            None | Some("global") => WidgetScope::Global,
            Some("1h") => WidgetScope::LastHour,
            Some(other) => return Err(format!("unknown scope `{other}`")),
        };
        let size = integer("size", self.size)?;
        Ok((scope, widget_size(size)))
    }
}

/// Reject events the index and leaderboards cannot use.
pub fn validate_events(events: &[ErrorEvent]) -> Result<(), String> {
    for (index, event) in events.iter().enumerate() {
        if parse_instant(event.timestamp.trim()).is_none() {
            return Err(format!("event {index}: `timestamp` must be an RFC 3339 timestamp"));
        }
        if event.user_id.trim().is_empty() {
            return Err(format!("event {index}: `userId` must not be empty"));
        }
        if event.error_message.trim().is_empty() {
            return Err(format!("event {index}: `errorMessage` must not be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> FiltersQuery {
        let encoded = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        serde_json::from_value(serde_json::Value::Object(
            url::form_urlencoded::parse(encoded.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned().into()))
                .collect(),
        ))
        .expect("query decodes")
    }

    #[test]
    fn empty_values_are_absent() {
        let filters = query(&[("browser", ""), ("page", ""), ("sort", "")])
            .validate()
            .expect("valid");
        assert_eq!(filters, SearchFilters::default());
    }

    #[test]
    fn q_is_a_keyword_alias() {
        let filters = query(&[("q", "TypeError")]).validate().expect("valid");
        assert_eq!(filters.keyword.as_deref(), Some("TypeError"));

        let filters = query(&[("q", "a"), ("keyword", "b")])
            .validate()
            .expect("valid");
        assert_eq!(filters.keyword.as_deref(), Some("b"));
    }

    #[test]
    fn paging_bounds_are_enforced() {
        assert!(query(&[("page", "0")]).validate().is_err());
        assert!(query(&[("page", "two")]).validate().is_err());
        assert!(query(&[("size", "501")]).validate().is_err());
        assert!(query(&[("size", "0")]).validate().is_err());

        let filters = query(&[("page", "3"), ("size", "500")])
            .validate()
            .expect("valid");
        assert_eq!(filters.page, Some(3));
        assert_eq!(filters.size, Some(500));
    }

    #[test]
    fn dates_must_be_rfc3339() {
        assert!(query(&[("start", "yesterday")]).validate().is_err());
        assert!(
            query(&[("start", "2024-05-01T10:00:00Z")])
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn sort_accepts_only_known_orders() {
        assert!(query(&[("sort", "newest")]).validate().is_err());
        let filters = query(&[("sort", " ASC ")]).validate().expect("valid");
        assert_eq!(filters.sort.as_deref(), Some(" ASC "));
    }

    #[test]
    fn widget_query_defaults_and_clamps() {
        let (scope, size) = WidgetsQuery::default().validate().expect("valid");
        assert_eq!(scope, WidgetScope::Global);
        assert_eq!(size, 5);

        let (scope, size) = WidgetsQuery {
            scope: Some("1h".into()),
            size: Some("99".into()),
        }
        .validate()
        .expect("valid");
        assert_eq!(scope, WidgetScope::LastHour);
        assert_eq!(size, 20);

        assert!(
            WidgetsQuery {
                scope: Some("1d".into()),
                size: None,
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn events_need_timestamp_user_and_message() {
        let mut event = ErrorEvent {
            timestamp: "2024-05-01T10:00:00Z".into(),
            user_id: "u1".into(),
            browser: None,
            url: None,
            error_message: "boom".into(),
            stack_trace: None,
        };
        assert!(validate_events(std::slice::from_ref(&event)).is_ok());

        event.user_id = "  ".into();
        let err = validate_events(&[event]).expect_err("blank user rejected");
        assert!(err.contains("userId"));
    }
}
