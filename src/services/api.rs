//! Client for the upstream content API.

use crate::models::{VideoModel, ViewsResponse};
use crate::services::cache::{CacheTag, FetchCache, FetchPolicy};
use crate::Config;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("video slug must not be empty")]
    InvalidSlug,
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { status: StatusCode, url: String },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

/// A decoded upstream response and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub cache: CacheStatus,
}

pub struct ContentApi {
    client: reqwest::Client,
    base_url: Url,
    cache: Arc<FetchCache>,
    video_max_age: Option<Duration>,
    views_delay: Duration,
}

impl ContentApi {
    pub fn new(config: &Config, cache: Arc<FetchCache>) -> anyhow::Result<Self> {
        let base_url = config.api_base_url()?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("api.base_url '{}' cannot be used as a base URL", base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(config.api.timeout())
            .user_agent(concat!("videoplay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            cache,
            video_max_age: config.cache.video_max_age(),
            views_delay: config.views.delay(),
        })
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `{base}/videos/{slug}`
    pub fn video_url(&self, slug: &str) -> Result<Url, ApiError> {
        if slug.is_empty() {
            return Err(ApiError::InvalidSlug);
        }
        Ok(self.endpoint(&["videos", slug]))
    }

    /// `{base}/videos/{id}/views`
    pub fn views_url(&self, video_id: i64) -> Url {
        self.endpoint(&["videos", &video_id.to_string(), "views"])
    }

    pub async fn get_video(&self, slug: &str) -> Result<VideoModel, ApiError> {
        Ok(self.fetch_video(slug).await?.value)
    }

    /// Fetches a video record, caching it under `video-{slug}`.
    pub async fn fetch_video(&self, slug: &str) -> Result<Fetched<VideoModel>, ApiError> {
        let url = self.video_url(slug)?;
        let policy = FetchPolicy::tagged(CacheTag::video(slug), self.video_max_age);
        self.fetch_json(url, &policy).await
    }

    /// Fetches the current view count. Waits `views.delay_ms` first and
    /// never touches the cache.
    pub async fn get_views(&self, video_id: i64) -> Result<u64, ApiError> {
        if !self.views_delay.is_zero() {
            tokio::time::sleep(self.views_delay).await;
        }
        let url = self.views_url(video_id);
        let fetched: Fetched<ViewsResponse> = self.fetch_json(url, &FetchPolicy::NoStore).await?;
        Ok(fetched.value.views)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: Url,
        policy: &FetchPolicy,
    ) -> Result<Fetched<T>, ApiError> {
        let key = url.as_str().to_string();

        if let FetchPolicy::Cache { .. } = policy {
            if let Some(body) = self.cache.get(&key) {
                tracing::debug!(url = %key, "fetch cache hit");
                let value = serde_json::from_value(body)
                    .map_err(|source| ApiError::Decode { url: key.clone(), source })?;
                return Ok(Fetched {
                    value,
                    cache: CacheStatus::Hit,
                });
            }
        }

        let seen = match policy {
            FetchPolicy::Cache { tags, .. } => Some(self.cache.generation(tags)),
            FetchPolicy::NoStore => None,
        };

        tracing::debug!(url = %key, "fetching from content API");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Request { url: key.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %key, %status, "content API returned an error status");
            return Err(ApiError::Status { status, url: key });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::Request { url: key.clone(), source })?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|source| ApiError::Decode { url: key.clone(), source })?;
        let value: T = serde_json::from_value(body.clone())
            .map_err(|source| ApiError::Decode { url: key.clone(), source })?;

        let cache = match (policy, seen) {
            (FetchPolicy::Cache { tags, max_age }, Some(seen)) => {
                if !self.cache.insert_if_current(&key, body, tags.clone(), *max_age, &seen) {
                    tracing::debug!(url = %key, "tag revalidated during fetch, response not cached");
                }
                CacheStatus::Miss
            }
            _ => CacheStatus::Bypass,
        };

        Ok(Fetched { value, cache })
    }
}
