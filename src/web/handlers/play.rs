use crate::services::after::AfterTasks;
use crate::services::api::ApiError;
use crate::services::views::{views_text, ViewCounter};
use crate::web::error::{AppError, AppResult};
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tera::Context;

fn make_context(state: &AppState) -> Context {
    let mut ctx = Context::new();
    ctx.insert("site", &state.config.site);
    ctx
}

fn not_found(state: &AppState) -> AppResult<Response> {
    let ctx = make_context(state);
    let html = state.templates.render("public/404.html", &ctx)?;
    Ok((StatusCode::NOT_FOUND, Html(html)).into_response())
}

fn upstream_error(state: &AppState, err: &ApiError) -> AppResult<Response> {
    tracing::error!("Failed to load video: {}", err);
    let ctx = make_context(state);
    let html = state.templates.render("public/error.html", &ctx)?;
    Ok((StatusCode::BAD_GATEWAY, Html(html)).into_response())
}

/// GET /:slug/play
pub async fn play(
    State(state): State<Arc<AppState>>,
    Extension(after): Extension<AfterTasks>,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let start = Instant::now();

    let fetched = match state.api.fetch_video(&slug).await {
        Ok(f) => f,
        Err(e) if e.is_not_found() || matches!(e, ApiError::InvalidSlug) => {
            return not_found(&state);
        }
        Err(e) => return upstream_error(&state, &e),
    };
    let video = fetched.value;
    let label = &state.config.site.views_label;
    let counter = ViewCounter::new(video.id, video.views);

    let policy = state.images.policy();
    let poster_width = policy.device_sizes().last().copied().unwrap_or_default();
    let poster = video
        .thumbnail
        .as_deref()
        .and_then(|src| policy.optimized_src(src, poster_width));
    let poster_srcset = video.thumbnail.as_deref().and_then(|src| policy.srcset(src));

    let mut ctx = make_context(&state);
    ctx.insert("video", &video);
    ctx.insert("counter", &counter);
    ctx.insert("views_text", &counter.views.map(|v| views_text(v, label)));
    ctx.insert("poster", &poster);
    ctx.insert("poster_srcset", &poster_srcset);

    let html = state.templates.render("public/play.html", &ctx)?;

    let cache = fetched.cache;
    let stats_state = state.clone();
    after.schedule("record-play-render", async move {
        stats_state.renders.record(cache);
        tracing::info!(
            slug = %slug,
            cache = ?cache,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rendered play page"
        );
    });

    Ok(Html(html).into_response())
}

#[derive(Deserialize)]
pub struct ViewsQuery {
    video_id: i64,
    #[serde(default)]
    views: Option<u64>,
}

/// GET /:slug/play/views — the view counter fragment loaded by the play page.
pub async fn views(
    State(state): State<Arc<AppState>>,
    Path(_slug): Path<String>,
    Query(query): Query<ViewsQuery>,
) -> AppResult<Html<String>> {
    let counter = ViewCounter::new(query.video_id, query.views);
    let text = counter
        .render(&state.api, &state.config.site.views_label)
        .await
        .map_err(AppError::bad_gateway)?;

    let mut ctx = Context::new();
    ctx.insert("views_text", &text);
    let html = state.templates.render("fragments/views.html", &ctx)?;
    Ok(Html(html))
}
