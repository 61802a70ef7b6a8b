//! Injectable sink for the two instrumented log streams.
//!
//! Diagnostics go through `tracing` like everything else; the operation-event
//! and object-version streams must round-trip, so they are emitted through a
//! sink the embedder injects. Tests capture output without touching a global
//! subscriber.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::tag;

pub trait TraceSink: Send + Sync {
    fn emit(&self, log_type: &str, payload: &str);
}

/// The canonical instrumented line: logger token, `LogType` marker, payload.
pub fn canonical_line(log_type: &str, payload: &str) -> String {
    format!(
        "{} {} {}",
        tag::LOGGER_NAME,
        tag::log_marker(log_type),
        payload
    )
}

/// Default sink: forwards canonical lines as `tracing` events with the
/// `sleeve` target so an ordinary subscriber carries the streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, log_type: &str, payload: &str) {
        tracing::info!(target: "sleeve", "{} {}", tag::log_marker(log_type), payload);
    }
}

/// Writes canonical lines to any writer (a trace file, a pipe).
pub struct WriterSink<W: Write + Send> {
    inner: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner().expect("writer sink lock")
    }
}

impl<W: Write + Send> TraceSink for WriterSink<W> {
    fn emit(&self, log_type: &str, payload: &str) {
        let mut writer = self.inner.lock().expect("writer sink lock");
        if let Err(err) = writeln!(writer, "{}", canonical_line(log_type, payload)) {
            tracing::error!(%err, "trace sink write failed");
        }
    }
}

/// Accumulates canonical lines in memory. Cloning shares the buffer, so a
/// test can keep a handle while the client owns the sink.
#[derive(Clone, Default)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("buffer sink lock").clone()
    }

    /// The buffered stream as one newline-joined trace.
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }
}

impl TraceSink for BufferSink {
    fn emit(&self, log_type: &str, payload: &str) {
        self.lines
            .lock()
            .expect("buffer sink lock")
            .push(canonical_line(log_type, payload));
    }
}
