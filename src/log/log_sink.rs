use crate::log::log_level::LogLevel;

/// Destination for leveled log lines. Shared as `Arc<dyn LogSink>` across
/// the accept loop, session threads and the client loops.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}
