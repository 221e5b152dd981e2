//! On-demand revalidation: request format, HMAC signing, and the client the
//! CLI uses to trigger it.

use crate::services::cache::CacheTag;
use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Videoplay-Signature";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("exactly one of `tag` or `slug` must be given")]
    Ambiguous,
    #[error("`tag` or `slug` must not be empty")]
    Empty,
}

impl RevalidateRequest {
    pub fn for_slug(slug: &str) -> Self {
        Self {
            tag: None,
            slug: Some(slug.to_string()),
        }
    }

    pub fn for_tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            slug: None,
        }
    }

    pub fn cache_tag(&self) -> Result<CacheTag, RequestError> {
        match (self.tag.as_deref(), self.slug.as_deref()) {
            (Some(""), None) | (None, Some("")) => Err(RequestError::Empty),
            (Some(tag), None) => Ok(CacheTag::new(tag)),
            (None, Some(slug)) => Ok(CacheTag::video(slug)),
            _ => Err(RequestError::Ambiguous),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidateResponse {
    pub revalidated: bool,
    pub tag: CacheTag,
    pub entries: usize,
    pub now: i64,
}

/// `sha256=<hex>` signature over `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid revalidation secret: {}", e))?;
    mac.update(body);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Constant-time check of a signature header value against `body`.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_sig) = signature.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Sends a signed revalidation request to a running server.
pub async fn send(
    server_url: &str,
    secret: &str,
    request: &RevalidateRequest,
) -> Result<RevalidateResponse> {
    let body = serde_json::to_vec(request)?;
    let signature = sign(secret, &body)?;
    let endpoint = format!("{}/api/revalidate", server_url.trim_end_matches('/'));

    let response = reqwest::Client::new()
        .post(&endpoint)
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header("User-Agent", concat!("videoplay-revalidate/", env!("CARGO_PKG_VERSION")))
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("{} returned HTTP {}: {}", endpoint, status, text);
    }

    Ok(response.json().await?)
}
