use super::handlers;
use super::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:slug/play", get(handlers::play::play))
        .route("/:slug/play/views", get(handlers::play::views))
        .route("/_image", get(handlers::image::image))
        .route("/health", get(health))
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/revalidate",
        post(handlers::revalidate::revalidate).layer(DefaultBodyLimit::max(64 * 1024)),
    )
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
