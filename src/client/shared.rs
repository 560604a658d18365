use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::callbacks::Callbacks;
use super::client_state::ClientState;
use super::stats::ClientStats;
use crate::protocol::{FrameError, PacketCodec, PacketType, Retry, write_packet};
use crate::transport::Transport;

/// State shared by the public handle and both client loops.
pub(crate) struct Shared {
    pub connected: AtomicBool,
    /// Armed on connect, consumed by whichever side notices the loss first.
    pub disconnect_pending: AtomicBool,
    pub state: Mutex<ClientState>,
    pub callbacks: Callbacks,
    pub stats: ClientStats,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(false),
            disconnect_pending: AtomicBool::new(false),
            state: Mutex::new(ClientState::Disconnected),
            callbacks: Callbacks::default(),
            stats: ClientStats::default(),
        }
    }
}

impl Shared {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> ClientState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ClientState::Disconnected)
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        match self.state.lock() {
            Ok(mut s) => *s = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// `Connected -> Disconnected` after a loss nobody asked for.
    pub(crate) fn mark_lost(&self) {
        if let Ok(mut s) = self.state.lock() {
            if *s == ClientState::Connected {
                *s = ClientState::Disconnected;
            }
        }
    }

    /// Runs the disconnect callback at most once per connect.
    pub(crate) fn notify_disconnect(&self) {
        if self.disconnect_pending.swap(false, Ordering::AcqRel) {
            self.callbacks.on_disconnect();
        }
    }
}

/// Outbound half of a connection: writes are serialized through one lock so the
/// heartbeat loop and API calls never interleave packets.
pub(crate) struct Link {
    writer: Mutex<Box<dyn Transport>>,
    control: Mutex<Box<dyn Transport>>,
    codec: PacketCodec,
}

impl Link {
    pub(crate) fn new(
        writer: Box<dyn Transport>,
        control: Box<dyn Transport>,
        codec: PacketCodec,
    ) -> Self {
        Self {
            writer: Mutex::new(writer),
            control: Mutex::new(control),
            codec,
        }
    }

    pub(crate) fn send(&self, packet_type: PacketType, payload: &[u8]) -> Result<(), FrameError> {
        let mut w = self
            .writer
            .lock()
            .map_err(|_| FrameError::Io(std::io::Error::other("writer lock poisoned")))?;
        write_packet(&mut **w, &self.codec, packet_type, payload, Retry::blocking())
    }

    /// Closes the socket under every clone.
    pub(crate) fn shutdown(&self) {
        if let Ok(c) = self.control.lock() {
            let _ = c.shutdown();
        }
    }
}
