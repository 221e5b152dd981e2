use crate::services::api::{ApiError, ContentApi};
use serde::Serialize;

/// Inline view counter for a video.
///
/// A count that is already known (including zero) is rendered as-is; only a
/// missing count triggers a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewCounter {
    pub video_id: i64,
    pub views: Option<u64>,
}

impl ViewCounter {
    pub fn new(video_id: i64, views: Option<u64>) -> Self {
        Self { video_id, views }
    }

    pub async fn resolve(&self, api: &ContentApi) -> Result<u64, ApiError> {
        match self.views {
            Some(views) => Ok(views),
            None => api.get_views(self.video_id).await,
        }
    }

    pub async fn render(&self, api: &ContentApi, label: &str) -> Result<String, ApiError> {
        let views = self.resolve(api).await?;
        Ok(views_text(views, label))
    }
}

pub fn views_text(views: u64, label: &str) -> String {
    format!("{} {}", views, label)
}
