use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "flac-stream-cli", version)]
pub struct Args {
    /// FLAC file to stream, or `-` for stdin
    pub input: PathBuf,

    /// Write decoded PCM (interleaved little-endian) to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Bytes fed to the decoder per chunk
    #[arg(long, default_value_t = 4096)]
    pub chunk_bytes: usize,

    /// Print one JSON line per event to stdout
    #[arg(long)]
    pub events: bool,

    /// Consecutive failed decode steps before the stream is ended (0 = unlimited)
    #[arg(long, default_value_t = 32)]
    pub max_failures: u32,

    /// Print the final session status as JSON
    #[arg(long)]
    pub status: bool,
}
