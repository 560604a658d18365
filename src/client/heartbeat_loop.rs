use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use super::shared::{Link, Shared};
use crate::log::LogSink;
use crate::protocol::PacketType;
use crate::{sink_trace, sink_warn};

/// Sends an empty HEARTBEAT every `interval` while connected.
///
/// A failed send clears the connected flag and closes the socket so the
/// receiver wakes up and reports the loss.
pub(crate) fn run_heartbeat(
    link: Arc<Link>,
    shared: Arc<Shared>,
    interval: Duration,
    stop: Receiver<()>,
    log: Arc<dyn LogSink>,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        if !shared.is_connected() {
            return;
        }
        if let Err(e) = link.send(PacketType::Heartbeat, &[]) {
            sink_warn!(log, "heartbeat send failed: {}", e);
            shared.connected.store(false, Ordering::Release);
            link.shutdown();
            return;
        }
        sink_trace!(log, "heartbeat sent");
    }
}
