use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::cursor::CursorSearchError;
use crate::application::error::ErrorReport;
use crate::application::ingest::IngestError;
use crate::application::leaderboard::LeaderboardError;
use crate::application::ports::SearchError;
use crate::application::search::SearchServiceError;

const REPORT_SOURCE: &str = "infra::http::api";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const INVALID_FILTERS: &str = "invalid_filters";
    pub const INVALID_CURSOR: &str = "invalid_cursor";
    pub const INVALID_EVENTS: &str = "invalid_events";
    pub const INVALID_WIDGET_QUERY: &str = "invalid_widget_query";
    pub const SEARCH_UNAVAILABLE: &str = "search_unavailable";
    pub const COUNTER_UNAVAILABLE: &str = "counter_unavailable";
    pub const SINK_UNAVAILABLE: &str = "sink_unavailable";
    pub const NOT_FOUND: &str = "not_found";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    chain: Vec<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            chain: Vec::new(),
        }
    }

    /// Keep the full error chain for the response log without exposing it in the body.
    fn caused_by(mut self, error: &dyn StdError) -> Self {
        self.chain = ErrorReport::from_error(REPORT_SOURCE, self.status, error).messages;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn invalid_filters(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_FILTERS,
            "Invalid search filters",
            Some(hint.into()),
        )
    }

    pub fn invalid_events(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_EVENTS,
            "Invalid error events",
            Some(hint.into()),
        )
    }

    pub fn invalid_widget_query(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_WIDGET_QUERY,
            "Invalid widget query",
            Some(hint.into()),
        )
    }

    pub fn invalid_cursor(error: &dyn StdError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_CURSOR,
            "Invalid or expired cursor",
            None,
        )
        .caused_by(error)
    }

    pub fn not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Route not found",
            None,
        )
    }

    fn search_unavailable(error: &SearchError) -> Self {
        if matches!(error, SearchError::SnapshotExpired(_)) {
            return Self::invalid_cursor(error);
        }
        Self::new(
            StatusCode::BAD_GATEWAY,
            codes::SEARCH_UNAVAILABLE,
            "Search backend unavailable",
            None,
        )
        .caused_by(error)
    }

    fn counter_unavailable(error: &dyn StdError) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::COUNTER_UNAVAILABLE,
            "Leaderboard store unavailable",
            None,
        )
        .caused_by(error)
    }
}

impl From<SearchServiceError> for ApiError {
    fn from(value: SearchServiceError) -> Self {
        match value {
            SearchServiceError::Search(err) => Self::search_unavailable(&err),
        }
    }
}

impl From<CursorSearchError> for ApiError {
    fn from(value: CursorSearchError) -> Self {
        match value {
            CursorSearchError::Cursor(err) => Self::invalid_cursor(&err),
            CursorSearchError::Search(err) => Self::search_unavailable(&err),
        }
    }
}

impl From<LeaderboardError> for ApiError {
    fn from(value: LeaderboardError) -> Self {
        Self::counter_unavailable(&value)
    }
}

impl From<IngestError> for ApiError {
    fn from(value: IngestError) -> Self {
        match value {
            IngestError::Sink(err) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::SINK_UNAVAILABLE,
                "Raw event store unavailable",
                None,
            )
            .caused_by(&err),
            IngestError::Index(err) => Self::search_unavailable(&err),
            IngestError::Leaderboard(err) => Self::counter_unavailable(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = if self.chain.is_empty() {
            ErrorReport::from_message(
                REPORT_SOURCE,
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        } else {
            ErrorReport {
                source: REPORT_SOURCE,
                status: self.status,
                messages: self.chain,
            }
        };

        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::PaginationError;
    use crate::application::ports::CounterError;

    #[test]
    fn expired_snapshot_is_reported_as_invalid_cursor() {
        let err = ApiError::from(CursorSearchError::Search(SearchError::SnapshotExpired(
            "pit-1".into(),
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_CURSOR);
    }

    #[test]
    fn engine_failures_map_to_bad_gateway() {
        let err = ApiError::from(SearchServiceError::Search(SearchError::Engine {
            status: 500,
            message: "shard failure".into(),
        }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.chain[0].contains("shard failure"));
    }

    #[test]
    fn tampered_cursor_maps_to_invalid_cursor() {
        let err = ApiError::from(CursorSearchError::Cursor(PaginationError::InvalidCursor(
            "bad signature".into(),
        )));
        assert_eq!(err.code(), codes::INVALID_CURSOR);
    }

    #[test]
    fn counter_outage_is_service_unavailable() {
        let err = ApiError::from(IngestError::Leaderboard(LeaderboardError::Counter(
            CounterError::unavailable("connection refused"),
        )));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), codes::COUNTER_UNAVAILABLE);

        let response = err.into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages.iter().any(|m| m.contains("connection refused")));
    }
}
