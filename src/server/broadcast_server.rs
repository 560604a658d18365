use std::mem;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;

use super::accept_loop::run_accept_loop;
use super::client_session::{EnqueueError, Outbound, SessionId, SessionInfo};
use super::heartbeat_monitor::run_heartbeat_monitor;
use super::registry::SessionRegistry;
use super::server_error::ServerError;
use super::server_state::ServerState;
use super::session_loop::SessionContext;
use crate::config::ServerSettings;
use crate::log::LogSink;
use crate::protocol::{AudioFrame, MediaKind, PacketType, ProtocolError, VideoFrame};
use crate::transport::{PlainTcp, Upgrader};
use crate::{sink_debug, sink_info, sink_warn};

/// Every n-th broadcast is logged at debug level.
const BROADCAST_LOG_EVERY: u64 = 30;

#[derive(Default)]
struct Workers {
    accept: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    monitor_stop: Option<Sender<()>>,
}

/// One producer, many consumers.
///
/// Owns the listening socket, the session registry and the background threads
/// (accept loop, heartbeat monitor, one reader and one writer per session).
/// Frames handed to `broadcast_*` are serialized once and queued to every
/// session that asked for that media type.
pub struct BroadcastServer {
    settings: Arc<ServerSettings>,
    log: Arc<dyn LogSink>,
    upgrader: Arc<dyn Upgrader>,
    state: Mutex<ServerState>,
    running: Arc<AtomicBool>,
    registry: Arc<SessionRegistry>,
    next_id: Arc<AtomicU16>,
    local_addr: Mutex<Option<SocketAddr>>,
    workers: Mutex<Workers>,
    session_threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
    broadcasts: AtomicU64,
}

impl BroadcastServer {
    /// Plain TCP server.
    pub fn new(settings: ServerSettings, log: Arc<dyn LogSink>) -> Self {
        Self::with_upgrader(settings, log, Arc::new(PlainTcp))
    }

    pub fn with_upgrader(
        settings: ServerSettings,
        log: Arc<dyn LogSink>,
        upgrader: Arc<dyn Upgrader>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            log,
            upgrader,
            state: Mutex::new(ServerState::Stopped),
            running: Arc::new(AtomicBool::new(false)),
            registry: Arc::new(SessionRegistry::new()),
            next_id: Arc::new(AtomicU16::new(1)),
            local_addr: Mutex::new(None),
            workers: Mutex::new(Workers::default()),
            session_threads: Arc::new(Mutex::new(Vec::new())),
            broadcasts: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Binds, then spawns the accept loop and the heartbeat monitor.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` unless stopped; `Bind` if the address cannot be bound.
    /// On error the server stays `Stopped`.
    pub fn start(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock()?;
            if *state != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning);
            }
            *state = ServerState::Starting;
        }

        match self.spawn_workers() {
            Ok(addr) => {
                *self.state.lock()? = ServerState::Running;
                sink_info!(
                    self.log,
                    "stream server listening on {} (max {} clients)",
                    addr,
                    self.settings.max_clients
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                *self.state.lock()? = ServerState::Stopped;
                sink_warn!(self.log, "stream server failed to start: {}", e);
                Err(e)
            }
        }
    }

    fn spawn_workers(&self) -> Result<SocketAddr, ServerError> {
        let listener =
            TcpListener::bind(self.settings.listen_addr()).map_err(ServerError::Bind)?;
        listener.set_nonblocking(true).map_err(ServerError::Bind)?;
        let addr = listener.local_addr()?;

        self.running.store(true, Ordering::Release);
        let ctx = SessionContext {
            settings: Arc::clone(&self.settings),
            registry: Arc::clone(&self.registry),
            running: Arc::clone(&self.running),
            log: Arc::clone(&self.log),
        };

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let monitor = {
            let registry = Arc::clone(&self.registry);
            let log = Arc::clone(&self.log);
            let scan = self.settings.heartbeat_scan_interval;
            let timeout = self.settings.heartbeat_timeout;
            thread::Builder::new()
                .name("heartbeat-monitor".into())
                .spawn(move || run_heartbeat_monitor(registry, scan, timeout, stop_rx, log))?
        };

        let accept = {
            let upgrader = Arc::clone(&self.upgrader);
            let next_id = Arc::clone(&self.next_id);
            let threads = Arc::clone(&self.session_threads);
            let spawned = thread::Builder::new()
                .name("accept-loop".into())
                .spawn(move || run_accept_loop(listener, ctx, upgrader, next_id, threads));
            match spawned {
                Ok(h) => h,
                Err(e) => {
                    drop(stop_tx);
                    let _ = monitor.join();
                    return Err(e.into());
                }
            }
        };

        *self.workers.lock()? = Workers {
            accept: Some(accept),
            monitor: Some(monitor),
            monitor_stop: Some(stop_tx),
        };
        *self.local_addr.lock()? = Some(addr);
        Ok(addr)
    }

    /// Stops accepting, closes every session and joins every thread.
    /// Calling it again, or on a server that never started, is a no-op.
    ///
    /// # Errors
    ///
    /// `Poisoned` if an internal lock was poisoned by a panicking thread.
    pub fn stop(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock()?;
            if *state != ServerState::Running {
                return Ok(());
            }
            *state = ServerState::Stopping;
        }
        sink_info!(self.log, "stopping stream server");
        self.running.store(false, Ordering::Release);

        let workers = mem::take(&mut *self.workers.lock()?);
        drop(workers.monitor_stop);
        let named = [
            ("accept loop", workers.accept),
            ("heartbeat monitor", workers.monitor),
        ];
        for (name, handle) in named {
            let Some(h) = handle else { continue };
            if h.join().is_err() {
                sink_warn!(self.log, "{} thread panicked", name);
            }
        }

        for session in self.registry.snapshot() {
            session.deactivate();
            session.shutdown_transport();
        }
        let threads = mem::take(&mut *self.session_threads.lock()?);
        let joined = threads.len();
        for h in threads {
            if h.join().is_err() {
                sink_warn!(self.log, "session thread panicked");
            }
        }
        self.registry.clear();

        *self.local_addr.lock()? = None;
        *self.state.lock()? = ServerState::Stopped;
        sink_info!(self.log, "stream server stopped ({} session threads joined)", joined);
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ServerState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Actual bound address while running; resolves a port-0 bind.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|a| *a)
    }

    /// Queues `frame` to every active session with video enabled.
    /// Returns how many sessions it was queued for.
    ///
    /// # Errors
    ///
    /// `Oversized` if the serialized frame exceeds the payload limit.
    pub fn broadcast_video_frame(&self, frame: &VideoFrame) -> Result<usize, ProtocolError> {
        self.broadcast(MediaKind::Video, frame.encode_payload())
    }

    /// Audio counterpart of [`broadcast_video_frame`](Self::broadcast_video_frame).
    ///
    /// # Errors
    ///
    /// `Oversized` if the samples exceed the payload limit.
    pub fn broadcast_audio_frame(&self, frame: &AudioFrame) -> Result<usize, ProtocolError> {
        self.broadcast(MediaKind::Audio, frame.encode_payload())
    }

    fn broadcast(&self, kind: MediaKind, payload: Vec<u8>) -> Result<usize, ProtocolError> {
        if payload.len() > self.settings.max_payload {
            return Err(ProtocolError::Oversized {
                declared: payload.len(),
                max: self.settings.max_payload,
            });
        }
        let payload = Bytes::from(payload);
        let out = self.registry.fan_out(kind, &payload);

        let n = self.broadcasts.fetch_add(1, Ordering::Relaxed) + 1;
        if n % BROADCAST_LOG_EVERY == 0 || out.dropped > 0 {
            sink_debug!(
                self.log,
                "broadcast #{} {:?} ({} bytes): queued {}, dropped {}",
                n,
                kind,
                payload.len(),
                out.queued,
                out.dropped
            );
        }
        Ok(out.queued)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn session_info(&self, id: SessionId) -> Option<SessionInfo> {
        self.registry.get(id).map(|s| s.info())
    }

    /// Sends DISCONNECT to one session and asks its read loop to close it.
    /// Returns false if no such session is registered.
    pub fn disconnect_client(&self, id: SessionId) -> bool {
        let Some(session) = self.registry.get(id) else {
            return false;
        };
        if let Err(EnqueueError::Full) = session.enqueue(Outbound::control(PacketType::Disconnect)) {
            sink_debug!(self.log, "[session {}] queue full, DISCONNECT dropped", id);
        }
        session.deactivate();
        sink_info!(self.log, "[session {}] disconnect requested by server", id);
        true
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
