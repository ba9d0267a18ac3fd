//! Append-only fault log.
//!
//! Constructed once per process: the size check (and deletion of an
//! oversized log) happens in [`DiagnosticLog::open`] only. Records are written
//! by a `tracing-appender` worker thread; recording never fails from the
//! caller's side. Dropping the log flushes pending records.

use crate::util::now_rfc3339;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

const APP: &str = concat!("docs2pdf ", env!("CARGO_PKG_VERSION"));

/// Captured regardless of `RUST_BACKTRACE`; empty where unsupported.
fn stack_trace() -> String {
    let trace = Backtrace::force_capture();
    match trace.status() {
        BacktraceStatus::Captured => trace.to_string(),
        _ => String::new(),
    }
}

/// One fault and whatever caused it.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: String,
    pub source: String,
    pub message: String,
    pub stack_trace: String,
    pub causes: Vec<Fault>,
}

impl Fault {
    /// Builds a fault from an error and its `source()` chain.
    pub fn from_error(kind: &str, origin: &str, err: &(dyn Error + 'static)) -> Self {
        let causes = err
            .source()
            .map(|cause| vec![Fault::from_cause(origin, cause)])
            .unwrap_or_default();
        Self {
            kind: kind.to_string(),
            source: origin.to_string(),
            message: err.to_string(),
            stack_trace: stack_trace(),
            causes,
        }
    }

    fn from_cause(origin: &str, err: &(dyn Error + 'static)) -> Self {
        let mut fault = Fault::from_error("cause", origin, err);
        fault.stack_trace = String::new();
        fault
    }

    /// A fault that wraps several independent inner faults.
    pub fn aggregate(kind: &str, origin: &str, message: &str, causes: Vec<Fault>) -> Self {
        Self {
            kind: kind.to_string(),
            source: origin.to_string(),
            message: message.to_string(),
            stack_trace: stack_trace(),
            causes,
        }
    }

    fn render(&self, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let _ = writeln!(out, "{pad}Exception: {}", self.kind);
        let _ = writeln!(out, "{pad}Source object: {}", self.source);
        let _ = writeln!(out, "{pad}Message: {}", self.message);
        if !self.stack_trace.is_empty() {
            let _ = writeln!(out, "{pad}Stack trace: {}", self.stack_trace);
        }
        for cause in &self.causes {
            let _ = writeln!(out, "{pad}Caused by:");
            cause.render(depth + 1, out);
        }
    }
}

struct Sink {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl Sink {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("diagnostic-log")
            .finish(file);
        Ok(Self {
            writer,
            _guard: guard,
        })
    }
}

pub struct DiagnosticLog {
    path: PathBuf,
    sink: Mutex<Option<Sink>>,
}

impl DiagnosticLog {
    /// Opens the log at `path`, deleting it first when it is larger than
    /// `max_bytes`.
    pub fn open(path: &Path, max_bytes: u64) -> Self {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() > max_bytes {
                if let Err(err) = std::fs::remove_file(path) {
                    warn!("cannot truncate diagnostic log {}: {err}", path.display());
                }
            }
        }

        let sink = match Sink::open(path) {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!("diagnostic log {} unavailable: {err}", path.display());
                None
            }
        };
        Self {
            path: path.to_path_buf(),
            sink: Mutex::new(sink),
        }
    }

    /// A log that drops every record.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            sink: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, fault: &Fault) {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = guard.as_mut() else {
            return;
        };
        let mut record = format!("----\n{APP}\nTimestamp: {}\n", now_rfc3339());
        fault.render(0, &mut record);
        record.push_str("----\n\n");
        // One write is one queued message, so records never interleave.
        if let Err(err) = sink.writer.write_all(record.as_bytes()) {
            warn!("diagnostic log write failed ({}): {err}", self.path.display());
        }
    }

    /// Blocks until every record sent so far has been written.
    ///
    /// Dropping the worker guard drains the queue; the file is then reopened
    /// for later records.
    pub fn flush(&self) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pending) = sink.take() else {
            return;
        };
        drop(pending);
        match Sink::open(&self.path) {
            Ok(reopened) => *sink = Some(reopened),
            Err(err) => warn!("diagnostic log {} unavailable: {err}", self.path.display()),
        }
    }
}
