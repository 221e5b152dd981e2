mod error;
mod handlers;
mod routes;
pub mod security;
mod state;

pub use state::{AppState, RenderCounts, RenderStats};

use crate::services::after::AfterTasks;
use crate::Config;
use anyhow::Result;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::public_routes())
        .merge(routes::api_routes())
        .layer(middleware::from_fn_with_state(state.clone(), after_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security::apply_security_headers,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: Config, addr: &str) -> Result<()> {
    if config.revalidate.secret.is_none() {
        tracing::warn!("revalidate.secret is not set, /api/revalidate is disabled");
    }
    if config.experimental.after {
        tracing::info!("experimental.after enabled");
    }

    let state = Arc::new(AppState::new(config)?);
    let app = app(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn after_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let after = AfterTasks::new();
    request.extensions_mut().insert(after.clone());

    let response = next.run(request).await;

    after.flush(state.config.experimental.after);
    response
}
