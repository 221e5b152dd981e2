use crate::services::images::ImageError;
use crate::web::state::AppState;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ImageQuery {
    url: String,
    w: u32,
}

/// GET /_image?url=..&w=..
pub async fn image(State(state): State<Arc<AppState>>, Query(query): Query<ImageQuery>) -> Response {
    match state.images.optimize(&query.url, query.w).await {
        Ok(img) => (
            [
                (header::CONTENT_TYPE, img.content_type),
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            img.data.clone(),
        )
            .into_response(),
        Err(e @ (ImageError::InvalidUrl(_) | ImageError::NotAllowed(_) | ImageError::InvalidWidth(_))) => {
            tracing::debug!("Rejected image request: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::warn!("Image optimization failed for {}: {}", query.url, e);
            (StatusCode::BAD_GATEWAY, "Could not load image").into_response()
        }
    }
}
