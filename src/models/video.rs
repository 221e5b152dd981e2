use serde::{Deserialize, Serialize};

/// A video record as served by the content API.
///
/// Only the fields the pages use are typed; everything else is kept in
/// `extra` so the record passes through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoModel {
    pub id: i64,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewsResponse {
    pub views: u64,
}
