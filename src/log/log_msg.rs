use crate::log::log_level::LogLevel;

/// One queued log line, stamped at the producer side.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub level: LogLevel,
    /// Milliseconds since the UNIX epoch.
    pub ts_ms: u128,
    pub text: String,
    /// Module path of the call site.
    pub target: &'static str,
}

impl LogMsg {
    pub fn new(
        level: LogLevel,
        text: impl Into<String>,
        target: &'static str,
        ts_ms: u128,
    ) -> Self {
        Self {
            level,
            ts_ms,
            text: text.into(),
            target,
        }
    }

    /// Renders the line the way the logger worker writes it to disk.
    pub fn render(&self) -> String {
        format!(
            "[{}] {} {} | {}",
            self.level, self.ts_ms, self.target, self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_level_target_and_text() {
        let msg = LogMsg::new(LogLevel::Warn, "session 3 timed out", "streamcast::server", 42);
        let line = msg.render();
        assert!(line.starts_with("[WARN] 42 "));
        assert!(line.contains("streamcast::server"));
        assert!(line.ends_with("session 3 timed out"));
    }
}
