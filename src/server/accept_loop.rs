use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::client_session::SessionId;
use super::session_loop::{SessionContext, run_session};
use crate::transport::Upgrader;
use crate::{sink_debug, sink_info, sink_warn};

/// Hands out ids `1..=65535`, each at most once. `None` once exhausted.
pub(crate) fn allocate_id(next: &AtomicU16) -> Option<SessionId> {
    next.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
        (n != 0).then_some(n.wrapping_add(1))
    })
    .ok()
}

/// Polls a non-blocking listener until the running flag drops, spawning one
/// session thread per connection. The listener is closed on return.
pub(crate) fn run_accept_loop(
    listener: TcpListener,
    ctx: SessionContext,
    upgrader: Arc<dyn Upgrader>,
    next_id: Arc<AtomicU16>,
    session_threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    let poll = ctx.settings.poll_interval.max(Duration::from_millis(1));

    while ctx.running.load(Ordering::Acquire) {
        let (stream, addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(poll);
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                sink_warn!(ctx.log, "accept failed: {} (continuing to accept)", e);
                thread::sleep(poll);
                continue;
            }
        };

        let Some(id) = allocate_id(&next_id) else {
            sink_warn!(ctx.log, "session ids exhausted, refusing {}", addr);
            continue;
        };

        if let Err(e) = stream.set_nonblocking(false) {
            sink_warn!(ctx.log, "[session {}] socket setup failed: {}", id, e);
            continue;
        }
        let transport = match upgrader.upgrade(stream) {
            Ok(t) => t,
            Err(e) => {
                sink_warn!(ctx.log, "[session {}] transport upgrade failed: {}", id, e);
                continue;
            }
        };

        sink_debug!(ctx.log, "accepted {} as session {}", addr, id);
        let session_ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || run_session(session_ctx, id, transport));

        match spawned {
            Ok(handle) => {
                if let Ok(mut threads) = session_threads.lock() {
                    threads.retain(|h| !h.is_finished());
                    threads.push(handle);
                }
            }
            Err(e) => sink_warn!(ctx.log, "[session {}] spawn failed: {}", id, e),
        }
    }

    sink_info!(ctx.log, "accept loop stopped, listener closed");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn ids_start_at_one_and_are_never_reused() {
        let next = AtomicU16::new(1);
        assert_eq!(allocate_id(&next), Some(1));
        assert_eq!(allocate_id(&next), Some(2));

        let near_end = AtomicU16::new(u16::MAX);
        assert_eq!(allocate_id(&near_end), Some(u16::MAX));
        assert_eq!(allocate_id(&near_end), None);
        assert_eq!(allocate_id(&near_end), None);
    }
}
