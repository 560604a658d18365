use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::protocol::{Capabilities, HandshakeRequest, MediaKind, PacketType, StreamConfig};
use crate::transport::Transport;

pub type SessionId = u16;

/// One packet waiting in a session's outbound queue.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    pub packet_type: PacketType,
    pub payload: Bytes,
}

impl Outbound {
    pub(crate) fn control(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            payload: Bytes::new(),
        }
    }
}

/// Why a packet did not make it into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueError {
    Full,
    Closed,
}

/// Read-only view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub client_name: String,
    pub capabilities: Capabilities,
    pub max_width: u16,
    pub max_height: u16,
    pub config: StreamConfig,
    pub active: bool,
    /// Time since the last valid packet from the peer.
    pub idle: Duration,
}

/// Server-side state of one handshaken connection.
///
/// `active` and the heartbeat clock are atomics so the broadcast path and the
/// heartbeat monitor can read them without touching the registry lock.
pub(crate) struct ClientSession {
    id: SessionId,
    peer: SocketAddr,
    request: HandshakeRequest,
    active: AtomicBool,
    epoch: Instant,
    last_heartbeat_us: AtomicU64,
    config: Mutex<StreamConfig>,
    outbound: Mutex<Option<SyncSender<Outbound>>>,
    control: Mutex<Box<dyn Transport>>,
}

impl ClientSession {
    pub(crate) fn new(
        id: SessionId,
        peer: SocketAddr,
        request: HandshakeRequest,
        outbound: SyncSender<Outbound>,
        control: Box<dyn Transport>,
    ) -> Self {
        let config = StreamConfig::from_capabilities(request.capabilities);
        Self {
            id,
            peer,
            request,
            active: AtomicBool::new(true),
            epoch: Instant::now(),
            last_heartbeat_us: AtomicU64::new(0),
            config: Mutex::new(config),
            outbound: Mutex::new(Some(outbound)),
            control: Mutex::new(control),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn client_name(&self) -> &str {
        &self.request.client_name
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Asks the read loop to wind the session down. Idempotent.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn touch(&self) {
        let us = u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.last_heartbeat_us.store(us, Ordering::Release);
    }

    pub(crate) fn idle(&self) -> Duration {
        let last = Duration::from_micros(self.last_heartbeat_us.load(Ordering::Acquire));
        self.epoch.elapsed().saturating_sub(last)
    }

    fn config_guard(&self) -> MutexGuard<'_, StreamConfig> {
        self.config.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn config(&self) -> StreamConfig {
        *self.config_guard()
    }

    pub(crate) fn set_config(&self, config: StreamConfig) {
        *self.config_guard() = config;
    }

    pub(crate) fn wants(&self, kind: MediaKind) -> bool {
        self.config_guard().enables(kind)
    }

    /// Never blocks: a full queue drops the packet.
    pub(crate) fn enqueue(&self, packet: Outbound) -> Result<(), EnqueueError> {
        let guard = self.outbound.lock().map_err(|_| EnqueueError::Closed)?;
        let Some(tx) = guard.as_ref() else {
            return Err(EnqueueError::Closed);
        };
        tx.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Disconnected(_) => EnqueueError::Closed,
        })
    }

    /// Drops the queue's sender; the writer drains what is left and exits.
    pub(crate) fn close_outbound(&self) {
        if let Ok(mut guard) = self.outbound.lock() {
            guard.take();
        }
    }

    /// Closes the socket under every clone, waking the read loop.
    pub(crate) fn shutdown_transport(&self) {
        if let Ok(control) = self.control.lock() {
            let _ = control.shutdown();
        }
    }

    pub(crate) fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer,
            client_name: self.request.client_name.clone(),
            capabilities: self.request.capabilities,
            max_width: self.request.max_width,
            max_height: self.request.max_height,
            config: self.config(),
            active: self.is_active(),
            idle: self.idle(),
        }
    }
}
