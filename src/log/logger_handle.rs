use std::sync::mpsc;

use crate::clock::now_millis;
use crate::log::{log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink};

/// Cloneable, non-blocking handle onto the process logger.
///
/// Every call stamps the message and `try_send`s it into the bounded queue
/// drained by the logger worker. A full queue drops the line; logging never
/// stalls a session thread.
#[derive(Clone)]
pub struct LoggerHandle {
    pub(super) tx: mpsc::SyncSender<LogMsg>,
}

impl LogSink for LoggerHandle {
    #[inline]
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        let _ = self.try_log(level, msg, target);
    }
}

impl LoggerHandle {
    /// # Errors
    /// - `TrySendError::Full` when the queue is at capacity (line dropped).
    /// - `TrySendError::Disconnected` when the logger worker is gone.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), mpsc::TrySendError<LogMsg>> {
        self.tx
            .try_send(LogMsg::new(level, text, target, now_millis()))
    }
}
