use crate::services::revalidate::{self, RevalidateRequest};
use crate::Config;
use anyhow::Result;
use std::path::Path;

pub async fn run(
    config_path: &Path,
    api_url: Option<&str>,
    slug: Option<String>,
    tag: Option<String>,
    server_url: &str,
) -> Result<()> {
    let config = Config::load(config_path, api_url)?;
    let Some(secret) = config.revalidate.secret.as_deref() else {
        anyhow::bail!("revalidate.secret must be set to sign revalidation requests");
    };

    let request = match (slug, tag) {
        (Some(slug), None) => RevalidateRequest::for_slug(&slug),
        (None, Some(tag)) => RevalidateRequest::for_tag(&tag),
        _ => anyhow::bail!("pass exactly one of --slug or --tag"),
    };
    request.cache_tag()?;

    let response = revalidate::send(server_url, secret, &request).await?;
    tracing::info!(
        "Revalidated '{}' on {} ({} cached entr{} dropped)",
        response.tag,
        server_url,
        response.entries,
        if response.entries == 1 { "y" } else { "ies" }
    );

    Ok(())
}
