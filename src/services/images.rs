//! Remote image allowlist and on-the-fly resizing.
//!
//! Only images whose URL matches one of the configured remote patterns are
//! fetched and served through `/_image`. Everything else is refused.

use crate::config::{ImagesConfig, RemotePatternConfig};
use crate::services::cache::{CacheTag, FetchCache};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use reqwest::header::CONTENT_TYPE;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const JPEG_QUALITY: u8 = 75;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("invalid image URL: {0}")]
    InvalidUrl(String),
    #[error("image host is not allowed: {0}")]
    NotAllowed(String),
    #[error("width {0} is not one of the configured device sizes")]
    InvalidWidth(u32),
    #[error("fetching image failed: {0}")]
    Fetch(String),
    #[error("could not process image: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    /// `*.example.com`: exactly one extra label.
    OneLabel(String),
    /// `**.example.com`: any number of extra labels.
    AnyDepth(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePattern {
    protocol: Option<String>,
    host: HostPattern,
    port: Option<u16>,
    pathname: Option<String>,
}

impl RemotePattern {
    pub fn from_config(config: &RemotePatternConfig) -> Self {
        let hostname = config.hostname.to_ascii_lowercase();
        let host = if let Some(rest) = hostname.strip_prefix("**.") {
            HostPattern::AnyDepth(rest.to_string())
        } else if let Some(rest) = hostname.strip_prefix("*.") {
            HostPattern::OneLabel(rest.to_string())
        } else {
            HostPattern::Exact(hostname)
        };

        Self {
            protocol: config
                .protocol
                .as_ref()
                .map(|p| p.trim_end_matches(':').to_ascii_lowercase()),
            host,
            port: config.port,
            pathname: config.pathname.clone(),
        }
    }

    pub fn matches(&self, url: &Url) -> bool {
        if let Some(ref protocol) = self.protocol {
            if url.scheme() != protocol {
                return false;
            }
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let host_ok = match &self.host {
            HostPattern::Exact(h) => host == *h,
            HostPattern::OneLabel(suffix) => host
                .strip_suffix(suffix.as_str())
                .and_then(|prefix| prefix.strip_suffix('.'))
                .is_some_and(|label| !label.is_empty() && !label.contains('.')),
            HostPattern::AnyDepth(suffix) => host
                .strip_suffix(suffix.as_str())
                .and_then(|prefix| prefix.strip_suffix('.'))
                .is_some_and(|labels| !labels.is_empty()),
        };
        if !host_ok {
            return false;
        }

        if let Some(port) = self.port {
            if url.port_or_known_default() != Some(port) {
                return false;
            }
        }

        match &self.pathname {
            None => true,
            Some(p) => match p.strip_suffix("/**") {
                Some(prefix) => url.path() == prefix || url.path().starts_with(&format!("{}/", prefix)),
                None => url.path() == p,
            },
        }
    }

    /// CSP source expression covering this pattern.
    fn csp_source(&self) -> String {
        let host = match &self.host {
            HostPattern::Exact(h) => h.clone(),
            HostPattern::OneLabel(s) | HostPattern::AnyDepth(s) => format!("*.{}", s),
        };
        let port = match self.port {
            Some(p) => p.to_string(),
            None => "*".to_string(),
        };
        match &self.protocol {
            Some(scheme) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}:{}", host, port),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImagePolicy {
    patterns: Vec<RemotePattern>,
    device_sizes: Vec<u32>,
}

impl ImagePolicy {
    pub fn new(config: &ImagesConfig) -> Self {
        let mut device_sizes = config.device_sizes.clone();
        device_sizes.sort_unstable();
        device_sizes.dedup();
        Self {
            patterns: config.remote_patterns.iter().map(RemotePattern::from_config).collect(),
            device_sizes,
        }
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && self.patterns.iter().any(|p| p.matches(url))
    }

    pub fn check_width(&self, width: u32) -> Result<u32, ImageError> {
        if self.device_sizes.contains(&width) {
            Ok(width)
        } else {
            Err(ImageError::InvalidWidth(width))
        }
    }

    pub fn device_sizes(&self) -> &[u32] {
        &self.device_sizes
    }

    pub fn csp_sources(&self) -> Vec<String> {
        self.patterns.iter().map(RemotePattern::csp_source).collect()
    }

    /// Path of the optimized variant of `src` at `width`, or `None` when the
    /// source is not on the allowlist.
    pub fn optimized_src(&self, src: &str, width: u32) -> Option<String> {
        let url = Url::parse(src).ok()?;
        if !self.is_allowed(&url) {
            return None;
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("url", src)
            .append_pair("w", &width.to_string())
            .finish();
        Some(format!("/_image?{}", query))
    }

    /// `srcset` attribute value spanning every device size.
    pub fn srcset(&self, src: &str) -> Option<String> {
        let parts: Option<Vec<String>> = self
            .device_sizes
            .iter()
            .map(|&w| self.optimized_src(src, w).map(|path| format!("{} {}w", path, w)))
            .collect();
        parts.map(|p| p.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

fn format_for(mime_type: &str) -> Option<ImageFormat> {
    match mime_type {
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        _ => "image/webp",
    }
}

/// Downscales `data` to at most `width` pixels wide, keeping the source format.
pub fn resize_image(data: &[u8], mime_type: &str, width: u32) -> Result<OptimizedImage, ImageError> {
    let format = format_for(mime_type)
        .ok_or_else(|| ImageError::Decode(format!("unsupported image type {}", mime_type)))?;

    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| ImageError::Decode(e.to_string()))?;
    let (orig_width, orig_height) = img.dimensions();

    let resized = if orig_width > width {
        let ratio = width as f32 / orig_width as f32;
        let new_height = ((orig_height as f32 * ratio) as u32).max(1);
        img.resize(width, new_height, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let (final_width, final_height) = resized.dimensions();
    let data = encode_image(&resized, format).map_err(|e| ImageError::Decode(e.to_string()))?;

    Ok(OptimizedImage {
        data,
        content_type: mime_for(format),
        width: final_width,
        height: final_height,
    })
}

fn encode_image(img: &DynamicImage, format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            let encoder = WebPEncoder::new_lossless(&mut buffer);
            encoder.encode(&rgba, width, height, image::ExtendedColorType::Rgba8)?;
        }
        other => {
            img.write_to(&mut buffer, other)?;
        }
    }

    Ok(buffer.into_inner())
}

pub struct ImageOptimizer {
    client: reqwest::Client,
    policy: ImagePolicy,
    cache: FetchCache<Arc<OptimizedImage>>,
    max_source_bytes: usize,
}

impl ImageOptimizer {
    pub const CACHE_TAG: &'static str = "images";

    pub fn new(config: &ImagesConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            policy: ImagePolicy::new(config),
            cache: FetchCache::with_capacity(config.cache_max_entries),
            max_source_bytes: config.max_source_bytes,
        })
    }

    pub fn policy(&self) -> &ImagePolicy {
        &self.policy
    }

    pub fn cache(&self) -> &FetchCache<Arc<OptimizedImage>> {
        &self.cache
    }

    pub async fn optimize(&self, src: &str, width: u32) -> Result<Arc<OptimizedImage>, ImageError> {
        let url = Url::parse(src).map_err(|_| ImageError::InvalidUrl(src.to_string()))?;
        if !self.policy.is_allowed(&url) {
            return Err(ImageError::NotAllowed(url.host_str().unwrap_or_default().to_string()));
        }
        let width = self.policy.check_width(width)?;

        let key = format!("{}#w={}", url, width);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ImageError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ImageError::Fetch(format!("{} returned HTTP {}", url, response.status())));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("image/"))
            .or_else(|| {
                mime_guess::from_path(url.path())
                    .first()
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_default();

        let bytes = self.read_body(&url, response).await?;

        let optimized = tokio::task::spawn_blocking(move || resize_image(&bytes, &mime_type, width))
            .await
            .map_err(|e| ImageError::Decode(e.to_string()))??;
        let optimized = Arc::new(optimized);

        self.cache
            .insert(&key, optimized.clone(), vec![CacheTag::new(Self::CACHE_TAG)], None);
        Ok(optimized)
    }

    async fn read_body(&self, url: &Url, mut response: reqwest::Response) -> Result<Vec<u8>, ImageError> {
        let too_large = || ImageError::Fetch(format!("{} is larger than {} bytes", url, self.max_source_bytes));

        let expected = response.content_length().unwrap_or(0);
        if expected > self.max_source_bytes as u64 {
            return Err(too_large());
        }

        let mut body = Vec::with_capacity(expected as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ImageError::Fetch(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_source_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(hostname: &str) -> RemotePattern {
        RemotePattern::from_config(&RemotePatternConfig::host(hostname))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn default_policy_allows_localhost_and_docker_host() {
        let policy = ImagePolicy::new(&ImagesConfig::default());
        assert!(policy.is_allowed(&url("http://localhost:8000/media/thumb.jpg")));
        assert!(policy.is_allowed(&url("http://host.docker.internal:8000/media/a.png")));
        assert!(!policy.is_allowed(&url("http://example.com/a.png")));
        assert!(!policy.is_allowed(&url("http://localhost.evil.com/a.png")));
    }

    #[test]
    fn non_http_schemes_are_refused() {
        let policy = ImagePolicy::new(&ImagesConfig::default());
        assert!(!policy.is_allowed(&url("file://localhost/etc/passwd")));
    }

    #[test]
    fn single_label_wildcard() {
        let p = pattern("*.example.com");
        assert!(p.matches(&url("https://cdn.example.com/a.png")));
        assert!(!p.matches(&url("https://a.b.example.com/a.png")));
        assert!(!p.matches(&url("https://example.com/a.png")));
        assert!(!p.matches(&url("https://badexample.com/a.png")));
    }

    #[test]
    fn any_depth_wildcard() {
        let p = pattern("**.example.com");
        assert!(p.matches(&url("https://cdn.example.com/a.png")));
        assert!(p.matches(&url("https://a.b.example.com/a.png")));
        assert!(!p.matches(&url("https://example.com/a.png")));
    }

    #[test]
    fn protocol_port_and_path_restrictions() {
        let p = RemotePattern::from_config(&RemotePatternConfig {
            protocol: Some("https:".to_string()),
            hostname: "media.example.com".to_string(),
            port: Some(443),
            pathname: Some("/thumbs/**".to_string()),
        });
        assert!(p.matches(&url("https://media.example.com/thumbs/a.png")));
        assert!(!p.matches(&url("http://media.example.com/thumbs/a.png")));
        assert!(!p.matches(&url("https://media.example.com:8443/thumbs/a.png")));
        assert!(!p.matches(&url("https://media.example.com/other/a.png")));
        assert!(!p.matches(&url("https://media.example.com/thumbsx/a.png")));
    }

    #[test]
    fn width_must_be_a_device_size() {
        let policy = ImagePolicy::new(&ImagesConfig::default());
        assert_eq!(policy.check_width(640).unwrap(), 640);
        assert!(matches!(policy.check_width(641), Err(ImageError::InvalidWidth(641))));
    }

    #[test]
    fn optimized_src_only_for_allowed_hosts() {
        let policy = ImagePolicy::new(&ImagesConfig::default());
        assert_eq!(
            policy.optimized_src("http://localhost:8000/t.jpg", 640).as_deref(),
            Some("/_image?url=http%3A%2F%2Flocalhost%3A8000%2Ft.jpg&w=640")
        );
        assert_eq!(policy.optimized_src("http://example.com/t.jpg", 640), None);
        assert_eq!(policy.srcset("http://example.com/t.jpg"), None);
    }

    #[test]
    fn csp_sources_cover_patterns() {
        let policy = ImagePolicy::new(&ImagesConfig::default());
        assert_eq!(
            policy.csp_sources(),
            vec!["localhost:*".to_string(), "host.docker.internal:*".to_string()]
        );
    }

    #[test]
    fn resize_downscales_png() {
        let img = DynamicImage::new_rgba8(800, 400);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();

        let out = resize_image(buf.get_ref(), "image/png", 256).unwrap();
        assert_eq!(out.width, 256);
        assert_eq!(out.height, 128);
        assert_eq!(out.content_type, "image/png");
    }

    #[test]
    fn resize_never_upscales() {
        let img = DynamicImage::new_rgba8(100, 50);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();

        let out = resize_image(buf.get_ref(), "image/png", 640).unwrap();
        assert_eq!(out.width, 100);
    }

    #[test]
    fn unsupported_type_is_rejected() {
        assert!(matches!(
            resize_image(b"not an image", "text/html", 256),
            Err(ImageError::Decode(_))
        ));
    }
}
