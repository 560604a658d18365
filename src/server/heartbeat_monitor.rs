use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use super::registry::SessionRegistry;
use crate::log::LogSink;
use crate::{sink_debug, sink_info};

/// Every `scan_interval`, flags sessions silent for longer than `timeout`.
///
/// Flagged sessions are left in the registry; their own read loops notice the
/// cleared flag, close the socket and remove themselves. Returns when `stop`
/// receives a value or its sender is dropped.
pub(crate) fn run_heartbeat_monitor(
    registry: Arc<SessionRegistry>,
    scan_interval: Duration,
    timeout: Duration,
    stop: Receiver<()>,
    log: Arc<dyn LogSink>,
) {
    sink_debug!(
        log,
        "heartbeat monitor started (scan {:?}, timeout {:?})",
        scan_interval,
        timeout
    );
    loop {
        match stop.recv_timeout(scan_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        for id in registry.flag_idle(timeout) {
            sink_info!(log, "[session {}] heartbeat timeout, evicting", id);
        }
    }
    sink_debug!(log, "heartbeat monitor stopped");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::protocol::Capabilities;
    use crate::server::client_session::tests::session_with;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn silent_session_is_flagged_within_one_scan_of_timeout() {
        let registry = Arc::new(SessionRegistry::new());
        let (s, _rx) = session_with(1, Capabilities::VIDEO, 1);
        let s = Arc::new(s);
        s.touch();
        registry.reserve(1);
        registry.commit(Arc::clone(&s));

        let (stop_tx, stop_rx) = mpsc::channel();
        let started = Instant::now();
        let monitor = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                run_heartbeat_monitor(
                    registry,
                    Duration::from_millis(20),
                    Duration::from_millis(100),
                    stop_rx,
                    Arc::new(NoopLogSink),
                )
            })
        };

        while s.is_active() {
            assert!(started.elapsed() < Duration::from_secs(2), "never evicted");
            thread::sleep(Duration::from_millis(5));
        }
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100));
        // Still registered: removal belongs to the read loop.
        assert_eq!(registry.len(), 1);

        drop(stop_tx);
        monitor.join().unwrap();
    }

    #[test]
    fn dropping_the_sender_stops_the_monitor_promptly() {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let monitor = thread::spawn(move || {
            run_heartbeat_monitor(
                Arc::new(SessionRegistry::new()),
                Duration::from_secs(60),
                Duration::from_secs(60),
                stop_rx,
                Arc::new(NoopLogSink),
            )
        });
        let started = Instant::now();
        drop(stop_tx);
        monitor.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
