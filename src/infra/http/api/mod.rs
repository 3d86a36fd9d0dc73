pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/events/search", get(handlers::search_events))
        .route("/events/stats", get(handlers::event_stats))
        .route("/events/search-pt", get(handlers::search_events_cursor))
        .route("/ingest", post(handlers::ingest_events))
        .route("/widgets/top", get(handlers::top_widgets))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
