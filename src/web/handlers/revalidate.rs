use crate::services::images::ImageOptimizer;
use crate::services::revalidate::{self, RevalidateRequest, RevalidateResponse, SIGNATURE_HEADER};
use crate::web::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

fn error(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": status.canonical_reason().unwrap_or("Error"),
        "message": message,
    });
    (status, Json(body)).into_response()
}

/// POST /api/revalidate
///
/// Called by the admin backend after a video changes. The body must be
/// signed with the shared secret.
pub async fn revalidate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = state.config.revalidate.secret.as_deref() else {
        return error(StatusCode::NOT_FOUND, "revalidation is not configured");
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !signature.is_some_and(|sig| revalidate::verify(secret, &body, sig)) {
        tracing::warn!("Rejected revalidation request with a missing or invalid signature");
        return error(StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let request: RevalidateRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error(StatusCode::BAD_REQUEST, &format!("invalid body: {}", e)),
    };
    let tag = match request.cache_tag() {
        Ok(t) => t,
        Err(e) => return error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let mut entries = state.api.cache().revalidate_tag(&tag);
    if tag.as_str() == ImageOptimizer::CACHE_TAG {
        entries += state.images.cache().revalidate_tag(&tag);
    }
    tracing::info!(tag = %tag, entries, "revalidated cache tag");

    Json(RevalidateResponse {
        revalidated: true,
        tag,
        entries,
        now: chrono::Utc::now().timestamp_millis(),
    })
    .into_response()
}
