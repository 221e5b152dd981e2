use anyhow::Result;
use std::path::PathBuf;

pub async fn run(path: PathBuf, api_url: Option<String>) -> Result<()> {
    let api_url = api_url.unwrap_or_else(|| "http://localhost:8000/api".to_string());

    std::fs::create_dir_all(&path)?;
    let config_path = path.join("videoplay.toml");
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    let config = format!(
        r#"[site]
title = "Videoplay"
language = "pt-BR"
views_label = "visualizações"

[server]
host = "127.0.0.1"
port = 3000

[api]
base_url = "{}"
timeout_secs = 30

[cache]
# video_max_age_secs = 300

[views]
delay_ms = 2000

[revalidate]
# secret = "change-me"

[images]
device_sizes = [256, 640, 1080, 1920]
cache_max_entries = 256
max_source_bytes = 20971520

[[images.remote_patterns]]
hostname = "localhost"

[[images.remote_patterns]]
hostname = "host.docker.internal"

[experimental]
after = true
"#,
        api_url
    );

    std::fs::write(&config_path, config)?;

    tracing::info!("Created {:?}", config_path);
    tracing::info!("Set revalidate.secret, then run 'videoplay serve'");

    Ok(())
}
