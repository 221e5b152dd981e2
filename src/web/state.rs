use crate::services::api::{CacheStatus, ContentApi};
use crate::services::cache::FetchCache;
use crate::services::images::ImageOptimizer;
use crate::web::security::content_security_policy;
use crate::Config;
use anyhow::Result;
use axum::http::HeaderValue;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tera::{Tera, Value};

pub struct AppState {
    pub config: Config,
    pub api: ContentApi,
    pub images: ImageOptimizer,
    pub templates: Tera,
    pub csp: HeaderValue,
    pub renders: RenderStats,
}

/// Play page renders, recorded after each response has been sent.
#[derive(Debug, Default)]
pub struct RenderStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderCounts {
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl RenderStats {
    pub fn record(&self, cache: CacheStatus) {
        let counter = match cache {
            CacheStatus::Hit => &self.cache_hits,
            CacheStatus::Miss | CacheStatus::Bypass => &self.cache_misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> RenderCounts {
        RenderCounts {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let mut templates = Tera::default();

        templates.register_filter("format_date", format_date_filter);
        templates.add_raw_templates(vec![
            ("base.html", include_str!("../../templates/base.html")),
            ("public/play.html", include_str!("../../templates/public/play.html")),
            ("public/404.html", include_str!("../../templates/public/404.html")),
            ("public/error.html", include_str!("../../templates/public/error.html")),
            ("fragments/views.html", include_str!("../../templates/fragments/views.html")),
        ])?;

        let api = ContentApi::new(&config, Arc::new(FetchCache::new()))?;
        let images = ImageOptimizer::new(&config.images, config.api.timeout())?;
        let csp = HeaderValue::from_str(&content_security_policy(images.policy()))?;

        Ok(Self {
            config,
            api,
            images,
            templates,
            csp,
            renders: RenderStats::default(),
        })
    }
}

fn format_date_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let date_str = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("format_date requires a string"))?;

    let format = args
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("%d/%m/%Y");

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date_str) {
        return Ok(Value::String(dt.format(format).to_string()));
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Value::String(dt.format(format).to_string()));
    }

    if let Ok(d) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Ok(Value::String(d.format(format).to_string()));
    }

    Ok(Value::String(date_str.to_string()))
}
