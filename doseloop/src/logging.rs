// src/logging.rs
//
// Telemetry sinks and diagnostics setup for doseloop.
// - EventSink:  trait used by the trainer
// - NoopSink:   discards all events
// - FileSink:   writes one JSON object per line (JSONL)
// - MemorySink: keeps events in memory (tests, in-process analysis)
// - init_tracing: installs the tracing subscriber for the binaries

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::rl::telemetry::{EpisodeMarker, TelemetryEvent, TickRecord};

/// Abstract sink for training telemetry.
pub trait EventSink {
    fn log_tick(&mut self, record: &TickRecord);

    fn log_marker(&mut self, marker: &EpisodeMarker);

    fn flush(&mut self) {}
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_tick(&mut self, _record: &TickRecord) {}

    fn log_marker(&mut self, _marker: &EpisodeMarker) {}
}

/// JSONL file sink.
pub struct FileSink {
    writer: BufWriter<File>,
    lines: u64,
}

impl FileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    fn write_event(&mut self, event: &TelemetryEvent) {
        // Telemetry failures must not abort training.
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(%err, "failed to encode telemetry event");
                return;
            }
        };
        if let Err(err) = writeln!(self.writer, "{line}") {
            tracing::warn!(%err, "failed to write telemetry event");
            return;
        }
        self.lines += 1;
    }
}

impl EventSink for FileSink {
    fn log_tick(&mut self, record: &TickRecord) {
        self.write_event(&TelemetryEvent::Tick(record.clone()));
    }

    fn log_marker(&mut self, marker: &EpisodeMarker) {
        self.write_event(&TelemetryEvent::Episode(marker.clone()));
    }

    fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            tracing::warn!(%err, "failed to flush telemetry file");
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<TelemetryEvent>,
}

impl MemorySink {
    pub fn ticks(&self) -> impl Iterator<Item = &TickRecord> {
        self.events.iter().filter_map(|e| match e {
            TelemetryEvent::Tick(t) => Some(t),
            TelemetryEvent::Episode(_) => None,
        })
    }

    pub fn markers(&self) -> impl Iterator<Item = &EpisodeMarker> {
        self.events.iter().filter_map(|e| match e {
            TelemetryEvent::Episode(m) => Some(m),
            TelemetryEvent::Tick(_) => None,
        })
    }
}

impl EventSink for MemorySink {
    fn log_tick(&mut self, record: &TickRecord) {
        self.events.push(TelemetryEvent::Tick(record.clone()));
    }

    fn log_marker(&mut self, marker: &EpisodeMarker) {
        self.events.push(TelemetryEvent::Episode(marker.clone()));
    }
}

/// Install a stderr fmt subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "doseloop=debug" } else { "doseloop=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
