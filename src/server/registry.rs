use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use super::client_session::{ClientSession, EnqueueError, Outbound, SessionId};
use crate::protocol::MediaKind;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<ClientSession>>,
    /// Slots promised to connections whose handshake reply is still in flight.
    reserved: usize,
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub queued: usize,
    pub dropped: usize,
}

/// The single lock every path (accept, broadcast, heartbeat scan, removal) goes through.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Holds a slot for a connection about to be accepted. False when full.
    pub(crate) fn reserve(&self, max_clients: usize) -> bool {
        let mut inner = self.lock();
        if inner.sessions.len() + inner.reserved >= max_clients {
            return false;
        }
        inner.reserved += 1;
        true
    }

    pub(crate) fn release(&self) {
        let mut inner = self.lock();
        inner.reserved = inner.reserved.saturating_sub(1);
    }

    /// Turns a reservation into a visible session.
    pub(crate) fn commit(&self, session: Arc<ClientSession>) {
        let mut inner = self.lock();
        inner.reserved = inner.reserved.saturating_sub(1);
        inner.sessions.insert(session.id(), session);
    }

    pub(crate) fn remove(&self, id: SessionId) -> Option<Arc<ClientSession>> {
        self.lock().sessions.remove(&id)
    }

    pub(crate) fn get(&self, id: SessionId) -> Option<Arc<ClientSession>> {
        self.lock().sessions.get(&id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub(crate) fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.lock().sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.lock().sessions.values().cloned().collect()
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.sessions.clear();
        inner.reserved = 0;
    }

    /// Queues `payload` on every active session that has `kind` enabled.
    pub(crate) fn fan_out(&self, kind: MediaKind, payload: &Bytes) -> FanOut {
        let inner = self.lock();
        let mut out = FanOut::default();
        for session in inner.sessions.values() {
            if !session.is_active() || !session.wants(kind) {
                continue;
            }
            let packet = Outbound {
                packet_type: kind.packet_type(),
                payload: payload.clone(),
            };
            match session.enqueue(packet) {
                Ok(()) => out.queued += 1,
                Err(EnqueueError::Full) | Err(EnqueueError::Closed) => out.dropped += 1,
            }
        }
        out
    }

    /// Clears `active` on every session idle for longer than `timeout`.
    /// Returns the ids flagged by this scan.
    pub(crate) fn flag_idle(&self, timeout: Duration) -> Vec<SessionId> {
        let inner = self.lock();
        inner
            .sessions
            .values()
            .filter(|s| s.is_active() && s.idle() > timeout)
            .filter_map(|s| s.deactivate().then_some(s.id()))
            .collect()
    }
}
