//! End-to-end runs over loopback: a real `BroadcastServer`, real
//! `StreamClient`s and hand-driven raw sockets.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, WriteBytesExt};
use streamcast::client::{ClientError, ClientState, StreamClient};
use streamcast::config::{ClientSettings, ServerSettings};
use streamcast::handshake::HandshakeError;
use streamcast::log::NoopLogSink;
use streamcast::protocol::{
    AudioFrame, Capabilities, HEADER_LEN, HANDSHAKE_RESPONSE_LEN, HandshakeRequest,
    HandshakeResponse, MAGIC, PROTOCOL_VERSION, PacketCodec, PacketHeader, PacketType,
    StreamConfig, VideoFrame,
};
use streamcast::server::{BroadcastServer, ServerError, ServerState};

const WAIT: Duration = Duration::from_secs(3);

fn test_settings() -> ServerSettings {
    ServerSettings {
        bind_addr: "127.0.0.1".to_owned(),
        port: 0,
        heartbeat_scan_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(400),
        handshake_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(5),
        ..ServerSettings::default()
    }
}

fn start_server(settings: ServerSettings) -> BroadcastServer {
    let server = BroadcastServer::new(settings, Arc::new(NoopLogSink));
    server.start().expect("server start");
    server
}

fn addr_of(server: &BroadcastServer) -> SocketAddr {
    server.local_addr().expect("bound address")
}

fn client_for(server: &BroadcastServer, name: &str, caps: Capabilities) -> StreamClient {
    let settings = ClientSettings {
        server_addr: "127.0.0.1".to_owned(),
        port: addr_of(server).port(),
        client_name: name.to_owned(),
        capabilities: caps,
        heartbeat_interval: Duration::from_millis(100),
        ..ClientSettings::default()
    };
    StreamClient::new(settings, Arc::new(NoopLogSink))
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn av() -> Capabilities {
    Capabilities::VIDEO | Capabilities::AUDIO
}

/// Forwards the shape of every video frame arriving at `client`; the last
/// field is the length of the pixel buffer handed to the callback.
fn watch_video(client: &StreamClient) -> mpsc::Receiver<(u16, u16, u8, usize)> {
    let (tx, rx) = mpsc::channel();
    client.set_video_callback(move |frame, pixels| {
        assert_eq!(pixels, &frame.data[..]);
        let _ = tx.send((frame.width, frame.height, frame.quality, pixels.len()));
    });
    rx
}

fn watch_audio(client: &StreamClient) -> mpsc::Receiver<usize> {
    let (tx, rx) = mpsc::channel();
    client.set_audio_callback(move |frame, _raw| {
        let _ = tx.send(frame.samples.len());
    });
    rx
}

fn count_disconnects(client: &StreamClient) -> Arc<AtomicUsize> {
    let n = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&n);
    client.set_disconnect_callback(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    n
}

// ---- raw socket helpers -------------------------------------------------

fn raw_packet(packet_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.write_u32::<LittleEndian>(MAGIC).unwrap();
    buf.write_u8(PROTOCOL_VERSION).unwrap();
    buf.write_u8(packet_type).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
    buf.write_u32::<LittleEndian>(0).unwrap();
    buf.write_u64::<LittleEndian>(0).unwrap();
    buf.extend_from_slice(payload);
    buf
}

fn read_raw_packet(stream: &mut TcpStream) -> (PacketHeader, Vec<u8>) {
    let mut head = [0u8; HEADER_LEN];
    stream.read_exact(&mut head).unwrap();
    let header = PacketHeader::decode(&head, 64 * 1024).unwrap();
    let mut payload = vec![0u8; header.payload_len()];
    stream.read_exact(&mut payload).unwrap();
    (header, payload)
}

/// Handshakes by hand and returns the socket plus the assigned id.
fn raw_session(addr: SocketAddr, caps: Capabilities) -> (TcpStream, u16) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let request = HandshakeRequest {
        client_name: "raw".to_owned(),
        capabilities: caps,
        max_width: 640,
        max_height: 480,
    };
    let codec = PacketCodec::default();
    let bytes = codec
        .encode(PacketType::Handshake, &request.encode())
        .unwrap();
    stream.write_all(&bytes).unwrap();

    let (header, payload) = read_raw_packet(&mut stream);
    assert_eq!(header.kind().unwrap(), PacketType::Handshake);
    assert_eq!(payload.len(), HANDSHAKE_RESPONSE_LEN);
    let response = HandshakeResponse::decode(&payload).unwrap();
    assert!(response.accepted);
    (stream, response.assigned_id)
}

/// True once the peer has closed the socket (EOF or reset).
fn closed_by_peer(stream: &mut TcpStream) -> bool {
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return false;
            }
            Err(_) => return true,
        }
    }
}

// ---- tests --------------------------------------------------------------

#[test]
fn first_client_gets_id_one_and_sees_the_frame() {
    let server = start_server(test_settings());
    let client = client_for(&server, "viewer", av());
    let frames = watch_video(&client);

    let id = client.connect().unwrap();
    assert_eq!(id, 1);
    assert_eq!(client.session_id(), Some(1));
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(client.server_info(), "StreamServer v1");
    assert!(wait_until(|| server.session_count() == 1));

    let frame = VideoFrame::synthetic(0, 1280, 720, 80, 1000, 0);
    assert_eq!(server.broadcast_video_frame(&frame).unwrap(), 1);

    let got = frames.recv_timeout(WAIT).unwrap();
    assert_eq!(got, (1280, 720, 80, 1000));
    assert!(frames.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(wait_until(|| client.video_frames_received() == 1));

    client.disconnect().unwrap();
    server.stop().unwrap();
}

#[test]
fn broadcast_reaches_only_sessions_that_want_the_media() {
    let server = start_server(test_settings());
    let both_a = client_for(&server, "a", av());
    let both_b = client_for(&server, "b", av());
    let audio_only = client_for(&server, "c", Capabilities::AUDIO);
    let video_rx = [watch_video(&both_a), watch_video(&both_b), watch_video(&audio_only)];
    let audio_rx = watch_audio(&audio_only);

    for c in [&both_a, &both_b, &audio_only] {
        c.connect().unwrap();
    }
    assert!(wait_until(|| server.session_count() == 3));

    let video = VideoFrame::synthetic(7, 320, 240, 50, 256, 0);
    assert_eq!(server.broadcast_video_frame(&video).unwrap(), 2);
    for rx in &video_rx[..2] {
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (320, 240, 50, 256));
    }
    assert!(video_rx[2].recv_timeout(Duration::from_millis(200)).is_err());

    let audio = AudioFrame::tone(7, 44_100, 1, 440.0, 1470, 0);
    assert_eq!(server.broadcast_audio_frame(&audio).unwrap(), 3);
    assert_eq!(audio_rx.recv_timeout(WAIT).unwrap(), 1470);

    server.stop().unwrap();
}

#[test]
fn oversized_frames_are_refused_before_fan_out() {
    let server = start_server(ServerSettings {
        max_payload: 1024,
        ..test_settings()
    });
    let frame = VideoFrame::synthetic(0, 16, 16, 10, 2048, 0);
    assert!(server.broadcast_video_frame(&frame).is_err());
    server.stop().unwrap();
}

#[test]
fn bad_handshakes_never_become_sessions() {
    let server = start_server(test_settings());
    let addr = addr_of(&server);

    // wrong type
    let mut wrong = TcpStream::connect(addr).unwrap();
    wrong
        .write_all(&raw_packet(PacketType::Heartbeat.as_u8(), &[]))
        .unwrap();
    // undersized request
    let mut short = TcpStream::connect(addr).unwrap();
    short
        .write_all(&raw_packet(PacketType::Handshake.as_u8(), &[0u8; 10]))
        .unwrap();
    // not our protocol at all
    let mut foreign = TcpStream::connect(addr).unwrap();
    foreign.write_all(b"GET / HTTP/1.1\r\n\r\nxxxxxxxxxx").unwrap();

    for stream in [&mut wrong, &mut short, &mut foreign] {
        assert!(closed_by_peer(stream));
    }
    assert_eq!(server.session_count(), 0);

    // The server keeps serving after the junk.
    let client = client_for(&server, "after-junk", av());
    client.connect().unwrap();
    assert!(wait_until(|| server.session_count() == 1));
    server.stop().unwrap();
}

#[test]
fn silent_handshake_times_out() {
    let server = start_server(test_settings());
    let mut idle = TcpStream::connect(addr_of(&server)).unwrap();
    let started = Instant::now();
    assert!(closed_by_peer(&mut idle));
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(server.session_count(), 0);
    server.stop().unwrap();
}

#[test]
fn heartbeat_is_acknowledged() {
    let server = start_server(test_settings());
    let (mut stream, _) = raw_session(addr_of(&server), Capabilities::NONE);

    stream
        .write_all(&raw_packet(PacketType::Heartbeat.as_u8(), &[]))
        .unwrap();
    let (header, payload) = read_raw_packet(&mut stream);
    assert_eq!(header.kind().unwrap(), PacketType::Ack);
    assert!(payload.is_empty());
    server.stop().unwrap();
}

#[test]
fn silent_session_is_evicted_within_one_scan_of_the_timeout() {
    let settings = test_settings();
    let timeout = settings.heartbeat_timeout;
    let scan = settings.heartbeat_scan_interval;
    let server = start_server(settings);

    let (mut stream, id) = raw_session(addr_of(&server), av());
    let last_sent = Instant::now();
    assert!(wait_until(|| server.session_count() == 1));
    assert!(server.session_info(id).unwrap().active);

    assert!(wait_until(|| server.session_count() == 0));
    let elapsed = last_sent.elapsed();
    assert!(elapsed >= timeout, "evicted after {elapsed:?}");
    // Generous slack for a loaded test machine.
    assert!(elapsed <= timeout + scan + Duration::from_millis(500));
    assert!(closed_by_peer(&mut stream));
    server.stop().unwrap();
}

#[test]
fn heartbeating_client_outlives_the_timeout() {
    let server = start_server(test_settings());
    let client = client_for(&server, "steady", av());
    client.connect().unwrap();
    thread::sleep(Duration::from_millis(1200));
    assert!(client.is_connected());
    assert_eq!(server.session_count(), 1);
    server.stop().unwrap();
}

#[test]
fn stop_closes_every_session_and_empties_the_registry() {
    let server = start_server(test_settings());
    let clients: Vec<_> = (0..3)
        .map(|i| client_for(&server, &format!("c{i}"), av()))
        .collect();
    let counters: Vec<_> = clients.iter().map(count_disconnects).collect();
    for c in &clients {
        c.connect().unwrap();
    }
    assert!(wait_until(|| server.session_count() == 3));

    server.stop().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(!server.is_running());
    assert_eq!(server.session_count(), 0);
    assert!(server.session_ids().is_empty());

    for (c, n) in clients.iter().zip(&counters) {
        assert!(wait_until(|| !c.is_connected()));
        assert!(wait_until(|| n.load(Ordering::SeqCst) == 1));
    }
    // A second stop is a no-op.
    server.stop().unwrap();
}

#[test]
fn client_disconnect_fires_callback_once() {
    let server = start_server(test_settings());
    let client = client_for(&server, "leaver", av());
    let calls = count_disconnects(&client);

    client.connect().unwrap();
    assert!(wait_until(|| server.session_count() == 1));

    client.disconnect().unwrap();
    assert!(!client.is_connected());
    assert_eq!(client.state(), ClientState::Disconnected);
    assert_eq!(client.session_id(), None);
    assert!(matches!(client.disconnect(), Err(ClientError::NotConnected)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // DISCONNECT reaches the server and the session goes away.
    assert!(wait_until(|| server.session_count() == 0));

    // A reconnect gets a fresh id.
    let id = client.connect().unwrap();
    assert_eq!(id, 2);
    client.disconnect().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    server.stop().unwrap();
}

#[test]
fn server_side_disconnect_reaches_the_client() {
    let server = start_server(test_settings());
    let client = client_for(&server, "kicked", av());
    let calls = count_disconnects(&client);
    let id = client.connect().unwrap();
    assert!(wait_until(|| server.session_count() == 1));

    assert!(server.disconnect_client(id));
    assert!(!server.disconnect_client(999));
    assert!(wait_until(|| !client.is_connected()));
    assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1));
    assert!(wait_until(|| server.session_count() == 0));

    // Reaping the dead connection does not fire the callback again.
    let _ = client.disconnect();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    server.stop().unwrap();
}

#[test]
fn config_update_changes_what_the_session_receives() {
    let server = start_server(test_settings());
    let client = client_for(&server, "tuner", av());
    let id = client.connect().unwrap();
    assert!(wait_until(|| server.session_count() == 1));

    let info = server.session_info(id).unwrap();
    assert_eq!(info.client_name, "tuner");
    assert_eq!(info.config, StreamConfig::from_capabilities(av()));

    let audio_only = StreamConfig {
        fps: 15,
        jpeg_quality: 50,
        enable_video: false,
        ..StreamConfig::from_capabilities(av())
    };
    client.send_config(&audio_only).unwrap();
    assert!(wait_until(|| {
        server
            .session_info(id)
            .is_some_and(|info| info.config == audio_only)
    }));

    let frame = VideoFrame::synthetic(1, 64, 64, 50, 64, 0);
    assert_eq!(server.broadcast_video_frame(&frame).unwrap(), 0);
    server.stop().unwrap();
}

#[test]
fn handshake_beyond_capacity_is_rejected() {
    let server = start_server(ServerSettings {
        max_clients: 1,
        ..test_settings()
    });
    let first = client_for(&server, "first", av());
    let second = client_for(&server, "second", av());

    first.connect().unwrap();
    let err = second.connect().unwrap_err();
    assert!(
        matches!(err, ClientError::Handshake(HandshakeError::Rejected(ref why)) if why == "server full"),
        "{err}"
    );
    assert_eq!(second.state(), ClientState::Disconnected);
    assert!(wait_until(|| server.session_count() == 1));

    // Capacity frees up once the first leaves.
    first.disconnect().unwrap();
    assert!(wait_until(|| server.session_count() == 0));
    second.connect().unwrap();
    server.stop().unwrap();
}

#[test]
fn start_reports_a_taken_port_and_double_start() {
    let squatter = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = squatter.local_addr().unwrap().port();
    let blocked = BroadcastServer::new(
        ServerSettings {
            port,
            ..test_settings()
        },
        Arc::new(NoopLogSink),
    );
    assert!(matches!(blocked.start(), Err(ServerError::Bind(_))));
    assert_eq!(blocked.state(), ServerState::Stopped);

    let server = start_server(test_settings());
    assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));
    server.stop().unwrap();
    // Restart after a clean stop.
    server.start().unwrap();
    assert!(server.is_running());
    server.stop().unwrap();
}

#[test]
fn connect_fails_cleanly_without_a_server() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let client = StreamClient::new(
        ClientSettings {
            server_addr: "127.0.0.1".to_owned(),
            port,
            ..ClientSettings::default()
        },
        Arc::new(NoopLogSink),
    );
    assert!(matches!(client.connect(), Err(ClientError::Connect(_))));
    assert!(!client.is_connected());
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[test]
fn junk_after_handshake_is_ignored() {
    let server = start_server(test_settings());
    let (mut stream, id) = raw_session(addr_of(&server), Capabilities::VIDEO);
    assert!(wait_until(|| server.session_count() == 1));
    let before = server.session_info(id).unwrap().config;

    // Unknown type, then a CONFIG of the wrong size.
    stream.write_all(&raw_packet(0x7F, &[])).unwrap();
    stream
        .write_all(&raw_packet(PacketType::Config.as_u8(), &[0u8; 5]))
        .unwrap();
    stream
        .write_all(&raw_packet(PacketType::Heartbeat.as_u8(), &[]))
        .unwrap();

    let (header, _) = read_raw_packet(&mut stream);
    assert_eq!(header.kind().unwrap(), PacketType::Ack);
    assert_eq!(server.session_ids(), vec![id]);
    let info = server.session_info(id).unwrap();
    assert!(info.active);
    assert_eq!(info.config, before);
    server.stop().unwrap();
}

#[test]
fn any_valid_packet_counts_as_liveness() {
    let settings = test_settings();
    let timeout = settings.heartbeat_timeout;
    let server = start_server(settings);
    let (mut stream, id) = raw_session(addr_of(&server), av());
    assert!(wait_until(|| server.session_count() == 1));

    let config = StreamConfig::from_capabilities(av()).encode();
    let until = Instant::now() + timeout * 3;
    while Instant::now() < until {
        stream
            .write_all(&raw_packet(PacketType::Config.as_u8(), &config))
            .unwrap();
        thread::sleep(timeout / 4);
    }
    assert_eq!(server.session_ids(), vec![id]);
    assert!(server.session_info(id).unwrap().active);
    server.stop().unwrap();
}

/// Plays the server side by hand: accepts one handshake and answers with
/// the accept reply and a DISCONNECT in a single write.
fn accept_then_hang_up(listener: &TcpListener) {
    let (mut peer, _) = listener.accept().unwrap();
    peer.set_read_timeout(Some(WAIT)).unwrap();
    let (header, _) = read_raw_packet(&mut peer);
    assert_eq!(header.kind().unwrap(), PacketType::Handshake);

    let codec = PacketCodec::default();
    let accept = HandshakeResponse::accept(9, "short-lived");
    let mut burst = codec
        .encode(PacketType::Handshake, &accept.encode())
        .unwrap();
    burst.extend(codec.encode(PacketType::Disconnect, &[]).unwrap());
    peer.write_all(&burst).unwrap();
    // Hold the socket until the client closes its end.
    let mut sink = [0u8; 64];
    while matches!(peer.read(&mut sink), Ok(n) if n > 0) {}
}

#[test]
fn immediate_disconnect_leaves_client_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let rounds = 20;
    let fake = thread::spawn(move || {
        for _ in 0..rounds {
            accept_then_hang_up(&listener);
        }
    });

    let client = StreamClient::new(
        ClientSettings {
            server_addr: "127.0.0.1".to_owned(),
            port,
            ..ClientSettings::default()
        },
        Arc::new(NoopLogSink),
    );
    let calls = count_disconnects(&client);
    for round in 1..=rounds {
        assert_eq!(client.connect().unwrap(), 9);
        assert!(wait_until(|| !client.is_connected()));
        assert!(wait_until(|| client.state() == ClientState::Disconnected));
        assert!(wait_until(|| calls.load(Ordering::SeqCst) == round));
        let _ = client.disconnect();
    }
    assert_eq!(calls.load(Ordering::SeqCst), rounds);
    fake.join().unwrap();
}
