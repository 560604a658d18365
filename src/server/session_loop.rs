use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use super::client_session::{ClientSession, EnqueueError, Outbound, SessionId};
use super::outbound::run_writer;
use super::registry::SessionRegistry;
use crate::config::ServerSettings;
use crate::handshake::{self, HandshakeError};
use crate::log::LogSink;
use crate::protocol::{
    HandshakeRequest, HandshakeResponse, Packet, PacketCodec, PacketType, Retry, StreamConfig,
    try_read_packet,
};
use crate::transport::Transport;
use crate::{sink_debug, sink_info, sink_warn};

/// Longest a blocking handshake read waits before re-checking the stop flag.
const HANDSHAKE_READ_SLICE: Duration = Duration::from_millis(50);

/// What a session thread needs from its server.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub settings: Arc<ServerSettings>,
    pub registry: Arc<SessionRegistry>,
    pub running: Arc<AtomicBool>,
    pub log: Arc<dyn LogSink>,
}

impl SessionContext {
    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Whole life of one accepted connection: handshake, read loop, teardown.
pub(crate) fn run_session(ctx: SessionContext, id: SessionId, mut transport: Box<dyn Transport>) {
    let Some((session, writer)) = open_session(&ctx, id, &mut transport) else {
        let _ = transport.shutdown();
        return;
    };

    let reason = read_loop(&ctx, &session, &mut transport);

    session.deactivate();
    ctx.registry.remove(id);
    session.close_outbound();
    if writer.join().is_err() {
        sink_warn!(ctx.log, "[session {}] writer thread panicked", id);
    }
    let _ = transport.shutdown();
    sink_info!(
        ctx.log,
        "[session {}] closed ({}), {} sessions left",
        id,
        reason,
        ctx.registry.len()
    );
}

/// Handshake phase. Nothing becomes visible in the registry unless the
/// accept reply went out.
fn open_session(
    ctx: &SessionContext,
    id: SessionId,
    transport: &mut Box<dyn Transport>,
) -> Option<(Arc<ClientSession>, thread::JoinHandle<()>)> {
    let settings = &ctx.settings;
    let deadline = Instant::now() + settings.handshake_timeout;
    let keep_going = || ctx.running() && Instant::now() < deadline;
    let retry = Retry::new(settings.poll_interval, &keep_going);

    if let Err(e) = transport.set_read_timeout(Some(HANDSHAKE_READ_SLICE)) {
        sink_warn!(ctx.log, "[session {}] cannot set read timeout: {}", id, e);
        return None;
    }

    let request = match handshake::read_request(&mut **transport, settings.max_payload, retry) {
        Ok(r) => r,
        Err(e) => {
            sink_info!(ctx.log, "[session {}] handshake failed: {}", id, e);
            return None;
        }
    };

    let codec = PacketCodec::new(settings.max_payload);
    if !ctx.registry.reserve(settings.max_clients) {
        sink_warn!(
            ctx.log,
            "[session {}] rejecting {:?}: {} clients already connected",
            id,
            request.client_name,
            settings.max_clients
        );
        let reject = HandshakeResponse::reject("server full");
        let _ = handshake::send_response(&mut **transport, &codec, &reject, retry);
        return None;
    }

    match start_session(ctx, id, transport, request, codec, retry) {
        Ok(opened) => Some(opened),
        Err(e) => {
            ctx.registry.release();
            sink_warn!(ctx.log, "[session {}] could not start: {}", id, e);
            None
        }
    }
}

fn start_session(
    ctx: &SessionContext,
    id: SessionId,
    transport: &mut Box<dyn Transport>,
    request: HandshakeRequest,
    codec: PacketCodec,
    retry: Retry<'_>,
) -> Result<(Arc<ClientSession>, thread::JoinHandle<()>), HandshakeError> {
    let settings = &ctx.settings;
    let peer = transport.peer_addr()?;
    let writer_side = transport.try_clone_box()?;
    let control = transport.try_clone_box()?;

    let accept = HandshakeResponse::accept(id, &settings.server_info);
    handshake::send_response(&mut **transport, &codec, &accept, retry)?;

    transport.set_read_timeout(Some(settings.poll_interval))?;
    transport.set_nonblocking(true)?;

    let (max_width, max_height) = (request.max_width, request.max_height);
    let (tx, rx) = mpsc::sync_channel(settings.outbound_queue_len);
    let session = Arc::new(ClientSession::new(id, peer, request, tx, control));
    session.touch();

    let writer = {
        let session = Arc::clone(&session);
        let log = Arc::clone(&ctx.log);
        let backoff = settings.poll_interval;
        thread::Builder::new()
            .name(format!("session-{id}-writer"))
            .spawn(move || run_writer(session, writer_side, codec, rx, backoff, log))?
    };

    ctx.registry.commit(Arc::clone(&session));
    let config = session.config();
    sink_info!(
        ctx.log,
        "[session {}] {:?} from {} connected (video={}, audio={}, max {}x{})",
        id,
        session.client_name(),
        peer,
        config.enable_video,
        config.enable_audio,
        max_width,
        max_height
    );
    Ok((session, writer))
}

/// Active phase. Returns a short reason for the log line.
fn read_loop(
    ctx: &SessionContext,
    session: &ClientSession,
    transport: &mut Box<dyn Transport>,
) -> &'static str {
    let keep_going = || session.is_active() && ctx.running();
    let retry = Retry::new(ctx.settings.poll_interval, &keep_going);

    while keep_going() {
        match try_read_packet(&mut **transport, ctx.settings.max_payload, retry) {
            Ok(None) => thread::sleep(ctx.settings.poll_interval),
            Ok(Some(packet)) => {
                session.touch();
                if let Flow::Stop = dispatch(ctx, session, &packet) {
                    return "client disconnect";
                }
            }
            Err(_) if !keep_going() => break,
            Err(e) if e.is_eof() => return "peer closed",
            Err(e) => {
                sink_warn!(ctx.log, "[session {}] read failed: {}", session.id(), e);
                return "read error";
            }
        }
    }

    if ctx.running() { "deactivated" } else { "server stopping" }
}

fn dispatch(ctx: &SessionContext, session: &ClientSession, packet: &Packet) -> Flow {
    let id = session.id();
    match packet.header.kind() {
        Ok(PacketType::Config) => match StreamConfig::decode(&packet.payload) {
            Ok(config) => {
                sink_info!(ctx.log, "[session {}] config updated: {:?}", id, config);
                session.set_config(config);
            }
            Err(e) => {
                sink_debug!(ctx.log, "[session {}] ignoring CONFIG: {}", id, e);
            }
        },
        Ok(PacketType::Heartbeat) => {
            if let Err(EnqueueError::Full) = session.enqueue(Outbound::control(PacketType::Ack)) {
                sink_debug!(ctx.log, "[session {}] queue full, ACK dropped", id);
            }
        }
        Ok(PacketType::Disconnect) => {
            sink_debug!(ctx.log, "[session {}] DISCONNECT received", id);
            session.deactivate();
            return Flow::Stop;
        }
        Ok(PacketType::Ack) => {}
        Ok(other) => {
            sink_debug!(ctx.log, "[session {}] ignoring {} from client", id, other);
        }
        Err(e) => {
            sink_debug!(ctx.log, "[session {}] ignoring packet: {}", id, e);
        }
    }
    Flow::Continue
}
