use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::domain::events::ErrorEvent;
use crate::domain::filters::SearchFilters;
use insights_api_types::{
    CursorSearchResponse, HealthResponse, SearchResponse, StatsResponse, TopWidgetsResponse,
};

use super::error::ApiError;
use super::models::{FiltersQuery, WidgetsQuery, validate_events};
use super::state::ApiState;

fn filters(query: Result<Query<FiltersQuery>, QueryRejection>) -> Result<SearchFilters, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::invalid_filters(err.body_text()))?;
    query.validate().map_err(ApiError::invalid_filters)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

pub async fn search_events(
    State(state): State<ApiState>,
    query: Result<Query<FiltersQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let filters = filters(query)?;
    Ok(Json(state.search.search(&filters).await?))
}

pub async fn event_stats(
    State(state): State<ApiState>,
    query: Result<Query<FiltersQuery>, QueryRejection>,
) -> Result<Json<StatsResponse>, ApiError> {
    let filters = filters(query)?;
    Ok(Json(state.search.stats(&filters).await?))
}

pub async fn search_events_cursor(
    State(state): State<ApiState>,
    query: Result<Query<FiltersQuery>, QueryRejection>,
) -> Result<Json<CursorSearchResponse>, ApiError> {
    let filters = filters(query)?;
    Ok(Json(state.cursor_search.search(&filters).await?))
}

pub async fn ingest_events(
    State(state): State<ApiState>,
    body: Result<Json<Vec<ErrorEvent>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(events) = body.map_err(|err| ApiError::invalid_events(err.body_text()))?;
    validate_events(&events).map_err(ApiError::invalid_events)?;

    let response = state.ingest.ingest(&events).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn top_widgets(
    State(state): State<ApiState>,
    query: Result<Query<WidgetsQuery>, QueryRejection>,
) -> Result<Json<TopWidgetsResponse>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::invalid_widget_query(err.body_text()))?;
    let (scope, size) = query.validate().map_err(ApiError::invalid_widget_query)?;
    Ok(Json(state.widgets.top(scope, size).await?))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
