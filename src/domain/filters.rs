//! Search filter records and their canonical form.
//!
//! [`SearchFilters`] is the closed record accepted from callers after boundary validation.
//! [`normalize`] turns it into [`NormalizedFilters`], the shape every cache key and search
//! request is derived from. Normalization is total and idempotent: two inputs that differ
//! only in casing, surrounding whitespace or sub-minute timestamp precision produce equal
//! values.

use serde::{Deserialize, Serialize};

pub use insights_api_types::SortOrder;

use crate::util::timestamp::{floor_to_minute, format_iso_millis, parse_instant};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Filters as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub start: Option<String>,
    pub end: Option<String>,
    pub user_id: Option<String>,
    pub browser: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "q")]
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
}

/// Canonical filters. Absent values are omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub page: u32,
    pub size: u32,
    pub sort: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// The aggregation view of [`NormalizedFilters`]: paging and ordering do not apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl Default for NormalizedFilters {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            user_id: None,
            browser: None,
            url: None,
            keyword: None,
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
            sort: SortOrder::Desc,
            cursor: None,
        }
    }
}

impl NormalizedFilters {
    pub fn stats_filters(&self) -> StatsFilters {
        StatsFilters {
            start: self.start.clone(),
            end: self.end.clone(),
            user_id: self.user_id.clone(),
            browser: self.browser.clone(),
            url: self.url.clone(),
            keyword: self.keyword.clone(),
        }
    }

    /// Number of rows skipped by offset pagination.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }

    /// Same filters without the continuation token.
    pub fn without_cursor(&self) -> Self {
        Self {
            cursor: None,
            ..self.clone()
        }
    }
}

impl StatsFilters {
    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }
}

impl From<NormalizedFilters> for SearchFilters {
    fn from(value: NormalizedFilters) -> Self {
        Self {
            start: value.start,
            end: value.end,
            user_id: value.user_id,
            browser: value.browser,
            url: value.url,
            keyword: value.keyword,
            page: Some(i64::from(value.page)),
            size: Some(i64::from(value.size)),
            sort: Some(value.sort.as_str().to_string()),
            cursor: value.cursor,
        }
    }
}

/// Canonicalize caller filters. Never fails; unusable values fall back to absent or
/// to their defaults.
pub fn normalize(raw: &SearchFilters) -> NormalizedFilters {
    NormalizedFilters {
        start: raw.start.as_deref().and_then(normalize_instant),
        end: raw.end.as_deref().and_then(normalize_instant),
        user_id: raw.user_id.as_deref().and_then(normalize_text),
        browser: raw.browser.as_deref().and_then(normalize_text),
        url: raw.url.as_deref().and_then(normalize_text),
        keyword: raw.keyword.as_deref().and_then(normalize_text),
        page: normalize_page(raw.page),
        size: normalize_size(raw.size),
        sort: normalize_sort(raw.sort.as_deref()),
        cursor: raw.cursor.as_deref().and_then(non_blank).map(str::to_string),
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn normalize_text(value: &str) -> Option<String> {
    non_blank(value).map(str::to_lowercase)
}

fn normalize_instant(value: &str) -> Option<String> {
    non_blank(value)
        .and_then(parse_instant)
        .map(|instant| format_iso_millis(floor_to_minute(instant)))
}

fn normalize_page(page: Option<i64>) -> u32 {
    match page {
        Some(value) if value >= 1 => u32::try_from(value).unwrap_or(u32::MAX),
        _ => DEFAULT_PAGE,
    }
}

fn normalize_size(size: Option<i64>) -> u32 {
    match size {
        Some(value) => {
            let clamped = value.clamp(1, i64::from(MAX_PAGE_SIZE));
            u32::try_from(clamped).unwrap_or(DEFAULT_PAGE_SIZE)
        }
        None => DEFAULT_PAGE_SIZE,
    }
}

pub(crate) fn normalize_sort(sort: Option<&str>) -> SortOrder {
    match sort.map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("asc") => SortOrder::Asc,
        _ => SortOrder::Desc,
    }
}
