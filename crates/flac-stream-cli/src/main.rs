//! flac-stream-cli: feed a FLAC file (or stdin) through a push-fed decode session.
//!
//! Input is read in `--chunk-bytes` pieces on a producer thread, decoded on the session worker,
//! and delivered on the main thread, which writes raw PCM to `--output` and, with `--events`,
//! one JSON line per event to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flac_stream_cli::cli::Args;
use flac_stream_cli::config::StreamConfig;
use flac_stream_cli::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flac_stream=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = StreamConfig::from_args(&args)?;
    let status = runtime::run_stream(&config, true)?;

    if config.print_status {
        let json = serde_json::to_string_pretty(&status).context("serialize status")?;
        println!("{json}");
    }
    Ok(())
}
