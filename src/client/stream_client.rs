use std::net::TcpStream;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::callbacks::{AudioCallback, DisconnectCallback, VideoCallback};
use super::client_error::ClientError;
use super::client_state::ClientState;
use super::heartbeat_loop::run_heartbeat;
use super::receive_loop::{AudioFormat, run_receiver};
use super::shared::{Link, Shared};
use super::stats::StatsSnapshot;
use crate::config::ClientSettings;
use crate::handshake;
use crate::log::LogSink;
use crate::protocol::{
    AudioFrame, HandshakeRequest, HandshakeResponse, PacketCodec, PacketType, Retry,
    StreamConfig, VideoFrame,
};
use crate::transport::{PlainTcp, Transport, Upgrader};
use crate::{sink_debug, sink_info, sink_warn};

/// Live connection: the write side plus the two loop threads.
struct Connection {
    link: Arc<Link>,
    receiver: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    heartbeat_stop: Option<Sender<()>>,
}

/// Consumer side of the stream.
///
/// `connect` performs the handshake and starts a receive loop (frames go to the
/// registered callbacks) and a heartbeat loop. The disconnect callback runs once
/// per successful connect, whichever side ends the connection.
pub struct StreamClient {
    settings: ClientSettings,
    log: Arc<dyn LogSink>,
    upgrader: Arc<dyn Upgrader>,
    shared: Arc<Shared>,
    conn: Mutex<Option<Connection>>,
    session_id: AtomicU16,
    server_info: Mutex<String>,
}

impl StreamClient {
    pub fn new(settings: ClientSettings, log: Arc<dyn LogSink>) -> Self {
        Self::with_upgrader(settings, log, Arc::new(PlainTcp))
    }

    pub fn with_upgrader(
        settings: ClientSettings,
        log: Arc<dyn LogSink>,
        upgrader: Arc<dyn Upgrader>,
    ) -> Self {
        Self {
            settings,
            log,
            upgrader,
            shared: Arc::new(Shared::default()),
            conn: Mutex::new(None),
            session_id: AtomicU16::new(0),
            server_info: Mutex::new(String::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn set_video_callback<F>(&self, f: F)
    where
        F: Fn(&VideoFrame, &[u8]) + Send + Sync + 'static,
    {
        let cb: VideoCallback = Arc::new(f);
        self.shared.callbacks.set_video(cb);
    }

    pub fn set_audio_callback<F>(&self, f: F)
    where
        F: Fn(&AudioFrame, &[u8]) + Send + Sync + 'static,
    {
        let cb: AudioCallback = Arc::new(f);
        self.shared.callbacks.set_audio(cb);
    }

    pub fn set_disconnect_callback<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let cb: DisconnectCallback = Arc::new(f);
        self.shared.callbacks.set_disconnect(cb);
    }

    /// Opens the socket, runs the handshake and starts both loops.
    /// Returns the session id the server assigned.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` if a connection is live; `Connect` if the socket cannot
    /// be opened; `Handshake` if the server does not accept us. On error the
    /// client is back in `Disconnected` and nothing keeps running.
    pub fn connect(&self) -> Result<u16, ClientError> {
        let mut slot = self.conn.lock()?;
        if self.shared.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        // The previous connection died on its own; reap its threads first.
        if let Some(stale) = slot.take() {
            self.teardown(stale);
        }

        self.shared.set_state(ClientState::Connecting);
        match self.open() {
            Ok((id, conn)) => {
                *slot = Some(conn);
                Ok(id)
            }
            Err(e) => {
                self.shared.set_state(ClientState::Disconnected);
                sink_warn!(
                    self.log,
                    "connect to {} failed: {}",
                    self.settings.server_endpoint(),
                    e
                );
                Err(e)
            }
        }
    }

    fn open(&self) -> Result<(u16, Connection), ClientError> {
        let endpoint = self.settings.server_endpoint();
        let stream = TcpStream::connect(&endpoint).map_err(ClientError::Connect)?;
        let mut transport = self.upgrader.upgrade(stream).map_err(ClientError::Connect)?;

        self.shared.set_state(ClientState::Handshaking);
        let codec = PacketCodec::new(self.settings.max_payload);
        let request = HandshakeRequest {
            client_name: self.settings.client_name.clone(),
            capabilities: self.settings.capabilities,
            max_width: self.settings.max_width,
            max_height: self.settings.max_height,
        };
        let response = match self.handshake(&mut transport, &codec, &request) {
            Ok(r) => r,
            Err(e) => {
                let _ = transport.shutdown();
                return Err(e);
            }
        };

        match self.spawn_loops(transport, codec) {
            Ok(conn) => {
                self.session_id.store(response.assigned_id, Ordering::Release);
                if let Ok(mut info) = self.server_info.lock() {
                    *info = response.server_info.clone();
                }
                sink_info!(
                    self.log,
                    "connected to {} as session {} ({})",
                    endpoint,
                    response.assigned_id,
                    response.server_info
                );
                Ok((response.assigned_id, conn))
            }
            Err(e) => Err(ClientError::Connect(e)),
        }
    }

    fn handshake(
        &self,
        transport: &mut Box<dyn Transport>,
        codec: &PacketCodec,
        request: &HandshakeRequest,
    ) -> Result<HandshakeResponse, ClientError> {
        let deadline = Instant::now() + self.settings.handshake_timeout;
        let keep_going = || Instant::now() < deadline;
        let retry = Retry::new(Duration::from_millis(5), &keep_going);
        transport
            .set_read_timeout(Some(self.settings.handshake_timeout))
            .map_err(ClientError::Connect)?;
        let response =
            handshake::perform(&mut **transport, codec, request, self.settings.max_payload, retry)?;
        transport.set_read_timeout(None).map_err(ClientError::Connect)?;
        Ok(response)
    }

    fn spawn_loops(
        &self,
        transport: Box<dyn Transport>,
        codec: PacketCodec,
    ) -> std::io::Result<Connection> {
        let writer = transport.try_clone_box()?;
        let control = transport.try_clone_box()?;
        let link = Arc::new(Link::new(writer, control, codec));

        self.shared.stats.reset();
        // Before the receiver exists, so a loss it sees right away can demote it.
        self.shared.set_state(ClientState::Connected);
        self.shared.connected.store(true, Ordering::Release);
        self.shared.disconnect_pending.store(true, Ordering::Release);

        let audio = AudioFormat {
            sample_rate: self.settings.audio_sample_rate,
            channels: self.settings.audio_channels,
        };
        let receiver = {
            let shared = Arc::clone(&self.shared);
            let log = Arc::clone(&self.log);
            let max_payload = self.settings.max_payload;
            thread::Builder::new()
                .name("client-receiver".into())
                .spawn(move || run_receiver(transport, shared, audio, max_payload, log))
        };
        let receiver = match receiver {
            Ok(h) => h,
            Err(e) => {
                self.abandon(&link);
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let heartbeat = {
            let link = Arc::clone(&link);
            let shared = Arc::clone(&self.shared);
            let log = Arc::clone(&self.log);
            let interval = self.settings.heartbeat_interval;
            thread::Builder::new()
                .name("client-heartbeat".into())
                .spawn(move || run_heartbeat(link, shared, interval, stop_rx, log))
        };
        let heartbeat = match heartbeat {
            Ok(h) => h,
            Err(e) => {
                self.abandon(&link);
                let _ = receiver.join();
                return Err(e);
            }
        };

        Ok(Connection {
            link,
            receiver: Some(receiver),
            heartbeat: Some(heartbeat),
            heartbeat_stop: Some(stop_tx),
        })
    }

    /// Undo of a half-started connect: no callback, since the caller gets an error.
    fn abandon(&self, link: &Link) {
        self.shared.disconnect_pending.store(false, Ordering::Release);
        self.shared.connected.store(false, Ordering::Release);
        link.shutdown();
    }

    /// Says goodbye, closes the socket and joins both loops.
    ///
    /// # Errors
    ///
    /// `NotConnected` if there is no connection, live or dead, to tear down.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        let conn = self.conn.lock()?.take();
        let Some(conn) = conn else {
            return Err(ClientError::NotConnected);
        };

        self.shared.set_state(ClientState::Disconnecting);
        if self.shared.connected.swap(false, Ordering::AcqRel) {
            if let Err(e) = conn.link.send(PacketType::Disconnect, &[]) {
                sink_debug!(self.log, "DISCONNECT not delivered: {}", e);
            }
        }
        self.teardown(conn);
        self.shared.set_state(ClientState::Disconnected);
        sink_info!(self.log, "disconnected");
        Ok(())
    }

    fn teardown(&self, mut conn: Connection) {
        self.shared.connected.store(false, Ordering::Release);
        drop(conn.heartbeat_stop.take());
        conn.link.shutdown();

        let me = thread::current().id();
        for handle in [conn.heartbeat.take(), conn.receiver.take()].into_iter().flatten() {
            // A callback may call disconnect() from the receiver thread itself.
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                sink_warn!(self.log, "client loop thread panicked");
            }
        }
        self.shared.notify_disconnect();
        self.session_id.store(0, Ordering::Release);
    }

    /// Replaces the session's stream config on the server.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a live connection; `Frame` if the write fails.
    pub fn send_config(&self, config: &StreamConfig) -> Result<(), ClientError> {
        let guard = self.conn.lock()?;
        let Some(conn) = guard.as_ref().filter(|_| self.shared.is_connected()) else {
            return Err(ClientError::NotConnected);
        };
        conn.link.send(PacketType::Config, &config.encode())?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Id assigned by the server, while connected.
    pub fn session_id(&self) -> Option<u16> {
        match self.session_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn server_info(&self) -> String {
        self.server_info
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn video_frames_received(&self) -> u64 {
        self.stats().video_frames
    }

    pub fn audio_frames_received(&self) -> u64 {
        self.stats().audio_frames
    }

    pub fn bytes_received(&self) -> u64 {
        self.stats().bytes_received
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
