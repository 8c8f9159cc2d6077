//! postclip-dl server binary

use clap::Parser;
use postclip_dl::{Config, ProgressBroadcaster, Retriever, run_with_shutdown};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Retrieve videos from social media posts over HTTP, with live progress.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "POSTCLIP_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the configuration and PORT).
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Path to the yt-dlp binary (overrides the configuration and YTDLP_PATH).
    #[arg(long)]
    ytdlp: Option<PathBuf>,
}

async fn run(args: Args) -> postclip_dl::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;

    if let Some(bind) = args.bind {
        config.server.api.bind_address = bind;
    }
    if let Some(path) = args.ytdlp {
        config.tool.binary_path = Some(path);
    }

    let broadcaster = Arc::new(ProgressBroadcaster::new(config.retrieval.observer_buffer));
    let retriever = Retriever::new(config, broadcaster).await?;

    run_with_shutdown(retriever).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "postclip-dl failed");
            ExitCode::FAILURE
        }
    }
}
