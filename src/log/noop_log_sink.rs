use crate::log::{log_level::LogLevel, log_sink::LogSink};

/// Swallows every line. Handy for tests and for embedding without a log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    #[inline]
    fn log(&self, _level: LogLevel, _msg: &str, _target: &'static str) {}
}
