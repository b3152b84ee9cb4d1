//! Logging boundary for the core.
//!
//! The engine never writes to stdout/stderr on its own and never picks a log
//! framework for its host. A frontend that wants core logs installs a
//! [`LogSink`] once per process; with no sink installed, logging compiles down
//! to a cheap flag check.

use std::fmt;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Trace,
    Info,
    Warn,
}

pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: Level, target: &'static str, args: fmt::Arguments);
}

static LOG_SINK: OnceLock<Box<dyn LogSink>> = OnceLock::new();

/// Install the process-wide log sink. Fails (returning the sink) if one was
/// already installed.
pub fn try_set_log_sink(sink: Box<dyn LogSink>) -> Result<(), Box<dyn LogSink>> {
    LOG_SINK.set(sink)
}

pub fn has_log_sink() -> bool {
    LOG_SINK.get().is_some()
}

pub(crate) fn emit(level: Level, target: &'static str, args: fmt::Arguments) {
    if let Some(sink) = LOG_SINK.get() {
        sink.log(level, target, args);
    }
}

/// Sink that prints one line per event to stderr. Handy for tests and
/// command-line hosts.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn log(&self, level: Level, target: &'static str, args: fmt::Arguments) {
        let tag = match level {
            Level::Trace => "trace",
            Level::Info => "info",
            Level::Warn => "warn",
        };
        eprintln!("[{tag}] {target}: {args}");
    }
}
