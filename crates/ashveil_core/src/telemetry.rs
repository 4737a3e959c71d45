//! # Telemetry Sink
//!
//! Write-only, line-structured JSON telemetry. One record per line:
//!
//! ```json
//! {"v":1,"timestamp":"2026-08-02T12:00:00.000Z","type":"metric",
//!  "component":"zone","message":"Zone tick completed","data":{...}}
//! ```
//!
//! ## Design
//!
//! The sink is an explicit handle ([`Telemetry`]) threaded through
//! constructors rather than a process global. Cloning is cheap (an `Arc`
//! bump); all clones share the same sinks. Emission serialises writes with a
//! single lock around the configured sinks, so records from the network and
//! simulation threads never interleave mid-line.
//!
//! Tests use [`Telemetry::memory`] to capture records in-process and assert
//! on their content.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;

/// Schema version stamped into every record.
pub const TELEMETRY_SCHEMA_VERSION: u32 = 1;

/// Errors raised while constructing a telemetry handle.
///
/// These are unrecoverable per the error-handling contract: the caller of
/// initialisation surfaces them and the process exits before the tick loop.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The configured log file could not be opened for appending.
    #[error("failed to open telemetry file {path:?}: {source}")]
    FileOpen {
        /// The path that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Record categories, matching the `type` field of the line schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// Periodic numeric measurements (tick durations, pipeline counters).
    Metric,
    /// Discrete occurrences (connections, fault activations, transitions).
    Event,
    /// Zone/system health snapshots.
    Health,
    /// Failures worth an operator's attention.
    Error,
}

impl RecordKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Event => "event",
            Self::Health => "health",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the telemetry sinks.
#[derive(Clone, Debug, Default)]
pub struct TelemetryConfig {
    /// Path to the JSON Lines file. `None` disables file output.
    pub file_path: Option<PathBuf>,
    /// Whether to also write records to stdout.
    pub stdout: bool,
}

/// Shared in-memory capture buffer returned by [`Telemetry::memory`].
///
/// Each captured line is a complete JSON record without the trailing newline.
#[derive(Clone, Debug, Default)]
pub struct MemoryBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryBuffer {
    /// Returns a snapshot of all captured lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Parses every captured line back into JSON for assertions.
    #[must_use]
    pub fn records(&self) -> Vec<Value> {
        self.lines
            .lock()
            .iter()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    /// Number of captured records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

struct Sinks {
    file: Option<File>,
    stdout: bool,
    memory: Option<MemoryBuffer>,
}

/// Handle to the shared telemetry sinks.
///
/// Cheap to clone; every subsystem that emits records holds one.
#[derive(Clone)]
pub struct Telemetry {
    sinks: Arc<Mutex<Sinks>>,
    enabled: bool,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry").field("enabled", &self.enabled).finish()
    }
}

impl Telemetry {
    /// Opens sinks according to `config`.
    ///
    /// Fails if the file sink cannot be opened; the server treats that as
    /// fatal before entering the tick loop.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let file = match &config.file_path {
            Some(path) => Some(open_append(path)?),
            None => None,
        };
        Ok(Self {
            sinks: Arc::new(Mutex::new(Sinks { file, stdout: config.stdout, memory: None })),
            enabled: true,
        })
    }

    /// A handle that drops every record. Used by subsystems under test that
    /// do not assert on telemetry.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sinks: Arc::new(Mutex::new(Sinks { file: None, stdout: false, memory: None })),
            enabled: false,
        }
    }

    /// A handle that captures records in memory, for tests.
    #[must_use]
    pub fn memory() -> (Self, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        let telemetry = Self {
            sinks: Arc::new(Mutex::new(Sinks {
                file: None,
                stdout: false,
                memory: Some(buffer.clone()),
            })),
            enabled: true,
        };
        (telemetry, buffer)
    }

    /// Emits a `metric` record.
    pub fn metric(&self, component: &str, message: &str, data: Value) {
        self.emit(RecordKind::Metric, component, message, data);
    }

    /// Emits an `event` record.
    pub fn event(&self, component: &str, message: &str, data: Value) {
        self.emit(RecordKind::Event, component, message, data);
    }

    /// Emits a `health` record.
    pub fn health(&self, component: &str, message: &str, data: Value) {
        self.emit(RecordKind::Health, component, message, data);
    }

    /// Emits an `error` record.
    pub fn error(&self, component: &str, message: &str, data: Value) {
        self.emit(RecordKind::Error, component, message, data);
    }

    /// Formats and writes one record to every configured sink.
    pub fn emit(&self, kind: RecordKind, component: &str, message: &str, data: Value) {
        if !self.enabled {
            return;
        }
        let line = format_record(kind, component, message, data);
        let mut sinks = self.sinks.lock();
        if sinks.stdout {
            println!("{line}");
        }
        if let Some(file) = sinks.file.as_mut() {
            // A full disk must not take the simulation down with it.
            if writeln!(file, "{line}").and_then(|()| file.flush()).is_err() {
                tracing::warn!("telemetry file write failed; dropping record");
            }
        }
        if let Some(memory) = &sinks.memory {
            memory.lines.lock().push(line);
        }
    }

    /// Flushes the file sink. Called once on orderly shutdown.
    pub fn flush(&self) {
        if let Some(file) = self.sinks.lock().file.as_mut() {
            let _ = file.flush();
        }
    }
}

fn open_append(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::FileOpen { path: path.to_path_buf(), source })
}

fn format_record(kind: RecordKind, component: &str, message: &str, data: Value) -> String {
    let mut record = json!({
        "v": TELEMETRY_SCHEMA_VERSION,
        "timestamp": Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "type": kind.as_str(),
        "component": component,
        "message": message,
    });
    let include_data = match &data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    if include_data {
        record["data"] = data;
    }
    record.to_string()
}
