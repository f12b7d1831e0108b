//! Stream runtime.
//!
//! A producer thread feeds the input through a session [`Feeder`] while this thread runs the
//! [`EventLoop`] and writes each delivered event out.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use flac_stream::{Event, EventLoop, Feeder, Format, SessionStatus, Tags};
use serde::Serialize;

use crate::config::{Input, StreamConfig};

const LOOP_POLL: Duration = Duration::from_millis(50);

/// One `--events` output line.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventLine<'a> {
    Format {
        sample_rate: u32,
        channels: u32,
        bits_per_sample: u32,
    },
    Metadata {
        tags: &'a Tags,
    },
    Data {
        bytes: usize,
    },
    Done,
    End,
}

/// Writes delivered events: PCM to `pcm`, JSON lines to `events`.
pub struct EventSink<P: Write, E: Write> {
    pcm: Option<P>,
    events: Option<E>,
    pcm_bytes: u64,
    format: Option<Format>,
}

impl<P: Write, E: Write> EventSink<P, E> {
    pub fn new(pcm: Option<P>, events: Option<E>) -> Self {
        Self {
            pcm,
            events,
            pcm_bytes: 0,
            format: None,
        }
    }

    pub fn handle(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Format(format) => {
                tracing::info!(format = %format, "output format");
                self.format = Some(*format);
            }
            Event::Metadata(tags) => {
                for (key, value) in tags.iter() {
                    tracing::info!(key, value, "tag");
                }
            }
            Event::Data(bytes) => {
                if let Some(pcm) = self.pcm.as_mut() {
                    pcm.write_all(bytes).context("write pcm output")?;
                }
                self.pcm_bytes += bytes.len() as u64;
            }
            Event::Done => tracing::debug!("decoder waiting for input"),
            Event::End => tracing::debug!("end of stream"),
        }

        if let Some(out) = self.events.as_mut() {
            let line = match event {
                Event::Format(f) => EventLine::Format {
                    sample_rate: f.sample_rate,
                    channels: f.channels,
                    bits_per_sample: f.bits_per_sample,
                },
                Event::Metadata(tags) => EventLine::Metadata { tags },
                Event::Data(bytes) => EventLine::Data { bytes: bytes.len() },
                Event::Done => EventLine::Done,
                Event::End => EventLine::End,
            };
            serde_json::to_writer(&mut *out, &line).context("write event line")?;
            out.write_all(b"\n").context("write event line")?;
        }
        Ok(())
    }

    pub fn pcm_bytes(&self) -> u64 {
        self.pcm_bytes
    }

    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Flush both outputs.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(pcm) = self.pcm.as_mut() {
            pcm.flush().context("flush pcm output")?;
        }
        if let Some(out) = self.events.as_mut() {
            out.flush().context("flush event output")?;
        }
        Ok(())
    }
}

/// Stream the configured input to completion and return the final session status.
pub fn run_stream(config: &StreamConfig, install_ctrlc: bool) -> Result<SessionStatus> {
    let cancel = Arc::new(AtomicBool::new(false));
    if install_ctrlc {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Relaxed);
        });
    }

    let reader: Box<dyn Read + Send> = match &config.input {
        Input::Stdin => Box::new(io::stdin()),
        Input::File(path) => {
            Box::new(File::open(path).with_context(|| format!("open {}", path.display()))?)
        }
    };
    let pcm = match &config.output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => None,
    };
    let events = config.print_events.then(io::stdout);

    let mut sink = EventSink::new(pcm, events);
    let status = run_stream_from(reader, &mut sink, config, &cancel)?;
    tracing::info!(
        pcm_bytes = sink.pcm_bytes(),
        frames = status.frames_decoded,
        decode_errors = status.decode_errors,
        "stream finished"
    );
    Ok(status)
}

/// Drive one session from `reader` into `sink` until the stream ends or `cancel` is set.
pub fn run_stream_from<R, P, E>(
    reader: R,
    sink: &mut EventSink<P, E>,
    config: &StreamConfig,
    cancel: &AtomicBool,
) -> Result<SessionStatus>
where
    R: Read + Send + 'static,
    P: Write,
    E: Write,
{
    let mut event_loop = EventLoop::with_config(config.session.clone());
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let id = event_loop.open_flac(move |event| {
        let _ = event_tx.send(event);
    })?;
    tracing::info!(session = %id, chunk_bytes = config.chunk_bytes, "streaming");

    let producer = spawn_producer(reader, event_loop.feeder(id)?, config.chunk_bytes)?;

    let mut cancelled = false;
    while event_loop.has_open_sessions() {
        if !cancelled && cancel.load(Ordering::Relaxed) {
            tracing::warn!(session = %id, "interrupted; closing session");
            event_loop.close(id)?;
            cancelled = true;
        }
        event_loop.run_once(LOOP_POLL);
        for event in event_rx.try_iter() {
            sink.handle(&event)?;
        }
    }
    for event in event_rx.try_iter() {
        sink.handle(&event)?;
    }
    sink.finish()?;

    let status = event_loop.status(id)?;
    event_loop.release(id)?;

    if cancelled {
        // The producer may still be blocked reading input; leave it behind.
        return Ok(status);
    }
    let fed = producer
        .join()
        .map_err(|_| anyhow!("input thread panicked"))??;
    tracing::debug!(bytes = fed, "input fully fed");
    Ok(status)
}

fn spawn_producer<R>(
    mut reader: R,
    feeder: Feeder,
    chunk_bytes: usize,
) -> Result<JoinHandle<Result<u64>>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("flac-feed".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; chunk_bytes];
            let mut total = 0u64;
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = feeder.end_input();
                        return Err(e).context("read input");
                    }
                };
                if let Err(e) = feeder.feed(&buf[..n]) {
                    tracing::debug!(session = %feeder.session_id(), "input no longer accepted: {e}");
                    return Ok(total);
                }
                total += n as u64;
            }
            if let Err(e) = feeder.end_input() {
                tracing::debug!(session = %feeder.session_id(), "end of input not accepted: {e}");
            }
            Ok(total)
        })
        .context("spawn input thread")
}
