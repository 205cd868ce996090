use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/links/:subject/series", get(handlers::get_series))
        .route("/api/links/:subject/refresh", post(handlers::refresh_series))
        .route("/api/links/:subject/events", get(handlers::stream_series))
        .with_state(state)
}
