use crate::services::images::ImagePolicy;
use crate::web::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, Response};
use axum::middleware::Next;
use std::sync::Arc;

/// CSP for the public pages. Remote images and video files may only come
/// from the configured remote patterns.
pub fn content_security_policy(policy: &ImagePolicy) -> String {
    let remote = policy.csp_sources().join(" ");
    format!(
        "default-src 'self'; script-src 'self' https://unpkg.com; style-src 'self' 'unsafe-inline'; \
         img-src 'self' data: {remote}; media-src 'self' {remote}; font-src 'self'; \
         frame-ancestors 'none'; base-uri 'self'; form-action 'self'",
        remote = remote
    )
}

pub fn security_headers<B>(mut response: Response<B>, csp: &HeaderValue) -> Response<B> {
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    headers.insert(header::CONTENT_SECURITY_POLICY, csp.clone());

    response
}

pub async fn apply_security_headers(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let response = next.run(request).await;
    security_headers(response, &state.csp)
}
