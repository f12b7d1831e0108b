use std::path::PathBuf;

use anyhow::{Result, bail};
use flac_stream::SessionConfig;

use crate::cli::Args;

/// Where compressed input comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub input: Input,
    pub output: Option<PathBuf>,
    pub chunk_bytes: usize,
    pub print_events: bool,
    pub print_status: bool,
    pub session: SessionConfig,
}

impl StreamConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.chunk_bytes == 0 {
            bail!("--chunk-bytes must be at least 1");
        }
        let input = if args.input.as_os_str() == "-" {
            Input::Stdin
        } else {
            Input::File(args.input.clone())
        };
        Ok(Self {
            input,
            output: args.output.clone(),
            chunk_bytes: args.chunk_bytes,
            print_events: args.events,
            print_status: args.status,
            session: SessionConfig {
                max_consecutive_failures: args.max_failures,
                ..SessionConfig::default()
            },
        })
    }
}
