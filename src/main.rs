use clap::Parser;
use videoplay::cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "videoplay=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let api_url = cli.api_url.as_deref();

    match cli.command {
        Some(Commands::Init { path }) => {
            videoplay::cli::init::run(path, cli.api_url.clone()).await?;
        }
        Some(Commands::Serve { host, port }) => {
            videoplay::cli::serve::run(&cli.config, api_url, host.as_deref(), port).await?;
        }
        Some(Commands::Revalidate { slug, tag, url }) => {
            videoplay::cli::revalidate::run(&cli.config, api_url, slug, tag, &url).await?;
        }
        Some(Commands::Check) => {
            videoplay::cli::check::run(&cli.config, api_url).await?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
