pub mod check;
pub mod init;
pub mod revalidate;
pub mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "videoplay")]
#[command(version)]
#[command(about = "Server-rendered video playback pages", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "videoplay.toml")]
    pub config: PathBuf,

    /// Base URL of the content API (overrides api.base_url)
    #[arg(long, env = "DJANGO_API_URL", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter config file
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Start the web server
    Serve {
        #[arg(short = 'H', long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Invalidate a cached video on a running server
    Revalidate {
        #[arg(long, conflicts_with = "tag", required_unless_present = "tag")]
        slug: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,
    },
    /// Validate the config and probe the content API
    Check,
}
