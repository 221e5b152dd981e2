use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub revalidate: RevalidateConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub experimental: ExperimentalConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Label rendered after the view count, e.g. `7 visualizações`.
    #[serde(default = "default_views_label")]
    pub views_label: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            language: default_language(),
            views_label: default_views_label(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the content API. Usually supplied via `DJANGO_API_URL`.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entries for video records expire after this many seconds. When unset
    /// they live until their tag is revalidated.
    #[serde(default)]
    pub video_max_age_secs: Option<u64>,
}

impl CacheConfig {
    pub fn video_max_age(&self) -> Option<Duration> {
        self.video_max_age_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewsConfig {
    /// Artificial delay before the view count is fetched (0 = none).
    #[serde(default = "default_views_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_views_delay_ms(),
        }
    }
}

impl ViewsConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RevalidateConfig {
    /// Shared HMAC secret. The revalidation endpoint is disabled without one.
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemotePatternConfig {
    #[serde(default)]
    pub protocol: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub pathname: Option<String>,
}

impl RemotePatternConfig {
    pub fn host(hostname: &str) -> Self {
        Self {
            protocol: None,
            hostname: hostname.to_string(),
            port: None,
            pathname: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagesConfig {
    #[serde(default = "default_remote_patterns")]
    pub remote_patterns: Vec<RemotePatternConfig>,
    #[serde(default = "default_device_sizes")]
    pub device_sizes: Vec<u32>,
    /// Resized images kept in memory. The oldest is evicted first.
    #[serde(default = "default_image_cache_entries")]
    pub cache_max_entries: usize,
    /// Source images larger than this are refused.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            remote_patterns: default_remote_patterns(),
            device_sizes: default_device_sizes(),
            cache_max_entries: default_image_cache_entries(),
            max_source_bytes: default_max_source_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExperimentalConfig {
    /// Run scheduled work after the response has been sent.
    #[serde(default)]
    pub after: bool,
}

fn default_title() -> String {
    "Videoplay".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_views_label() -> String {
    "visualizações".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_views_delay_ms() -> u64 {
    2000
}

fn default_remote_patterns() -> Vec<RemotePatternConfig> {
    vec![
        RemotePatternConfig::host("localhost"),
        RemotePatternConfig::host("host.docker.internal"),
    ]
}

fn default_device_sizes() -> Vec<u32> {
    vec![256, 640, 1080, 1920]
}

fn default_image_cache_entries() -> usize {
    256
}

fn default_max_source_bytes() -> usize {
    20 * 1024 * 1024
}

impl Config {
    /// A config with every section defaulted and the given API base URL.
    pub fn with_api_url(base_url: &str) -> Self {
        Self {
            site: SiteConfig::default(),
            server: ServerConfig::default(),
            api: ApiConfig {
                base_url: base_url.to_string(),
                ..ApiConfig::default()
            },
            cache: CacheConfig::default(),
            views: ViewsConfig::default(),
            revalidate: RevalidateConfig::default(),
            images: ImagesConfig::default(),
            experimental: ExperimentalConfig::default(),
        }
    }

    /// Load the config file, falling back to defaults when it does not exist.
    /// `api_url` overrides `api.base_url` (it carries `DJANGO_API_URL`).
    pub fn load(path: &Path, api_url: Option<&str>) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("Could not read config file '{}': {}", path.display(), e)
            })?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Config::with_api_url("")
        };

        if let Some(url) = api_url {
            config.api.base_url = url.to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            anyhow::bail!("api.base_url is required (set it in the config or via DJANGO_API_URL)");
        }
        let url = Url::parse(&self.api.base_url)
            .map_err(|e| anyhow::anyhow!("api.base_url '{}' is not a valid URL: {}", self.api.base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("api.base_url must use http or https, got '{}'", url.scheme());
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than 0");
        }
        if self.images.remote_patterns.iter().any(|p| p.hostname.is_empty()) {
            anyhow::bail!("images.remote_patterns entries must have a hostname");
        }
        if self.images.device_sizes.is_empty() || self.images.device_sizes.contains(&0) {
            anyhow::bail!("images.device_sizes must be a non-empty list of positive widths");
        }
        if self.images.cache_max_entries == 0 || self.images.max_source_bytes == 0 {
            anyhow::bail!("images.cache_max_entries and images.max_source_bytes must be greater than 0");
        }
        if matches!(self.revalidate.secret.as_deref(), Some("")) {
            anyhow::bail!("revalidate.secret must not be empty when set");
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.api.base_url)?)
    }
}
