use crate::{web, Config};
use anyhow::Result;
use std::path::Path;

pub async fn run(
    config_path: &Path,
    api_url: Option<&str>,
    host: Option<&str>,
    port: Option<u16>,
) -> Result<()> {
    let config = Config::load(config_path, api_url)?;

    let host = host.unwrap_or(&config.server.host).to_string();
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server at http://{}", addr);
    tracing::info!("Content API: {}", config.api.base_url);

    web::serve(config, &addr).await?;

    Ok(())
}
