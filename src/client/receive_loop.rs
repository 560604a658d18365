use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::shared::Shared;
use crate::log::LogSink;
use crate::protocol::{
    AudioFrame, HEADER_LEN, Packet, PacketType, ProtocolError, Retry, VideoFrame, read_packet,
};
use crate::transport::Transport;
use crate::{sink_info, sink_warn};

/// How the receiver interprets audio payloads, which carry bare samples.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

enum Flow {
    Continue,
    Stop,
}

/// Blocking read/dispatch loop. On exit the connected flag is cleared and the
/// disconnect callback is fired unless someone already fired it.
pub(crate) fn run_receiver(
    mut transport: Box<dyn Transport>,
    shared: Arc<Shared>,
    audio: AudioFormat,
    max_payload: usize,
    log: Arc<dyn LogSink>,
) {
    let keep_going = || shared.is_connected();
    let retry = Retry::new(Duration::from_millis(2), &keep_going);

    let reason = loop {
        match read_packet(&mut *transport, max_payload, retry) {
            Ok(packet) => {
                shared.stats.record_bytes(HEADER_LEN + packet.payload.len());
                match dispatch(&shared, &packet, audio) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => break "server sent DISCONNECT",
                    Err(e) => {
                        sink_warn!(log, "dropping connection on bad payload: {}", e);
                        break "bad payload";
                    }
                }
            }
            Err(_) if !keep_going() => break "local disconnect",
            Err(e) if e.is_eof() => break "server closed the connection",
            Err(e) => {
                sink_warn!(log, "receive failed: {}", e);
                break "read error";
            }
        }
    };

    shared.connected.store(false, Ordering::Release);
    shared.mark_lost();
    sink_info!(log, "receiver stopped: {}", reason);
    shared.notify_disconnect();
}

fn dispatch(shared: &Shared, packet: &Packet, audio: AudioFormat) -> Result<Flow, ProtocolError> {
    match packet.header.kind() {
        Ok(PacketType::VideoFrame) => {
            let frame = VideoFrame::decode_payload(&packet.payload)?;
            shared.stats.record_video();
            shared.callbacks.on_video(&frame, &frame.data);
        }
        Ok(PacketType::AudioFrame) => {
            let frame = AudioFrame::from_packet(
                &packet.header,
                &packet.payload,
                audio.sample_rate,
                audio.channels,
            )?;
            shared.stats.record_audio();
            shared.callbacks.on_audio(&frame, &packet.payload);
        }
        Ok(PacketType::Disconnect) => {
            shared.connected.store(false, Ordering::Release);
            return Ok(Flow::Stop);
        }
        // Acknowledgements and anything unexpected from the server.
        Ok(_) | Err(_) => {}
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::protocol::{MAX_PAYLOAD_LEN, PacketCodec};
    use crate::transport::{PlainTcp, Upgrader};
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    fn wired() -> (Box<dyn Transport>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (PlainTcp.upgrade(client).unwrap(), server)
    }

    const FORMAT: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
    };

    #[test]
    fn frames_reach_callbacks_and_disconnect_fires_once() {
        let (transport, mut server) = wired();
        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::SeqCst);
        shared.disconnect_pending.store(true, Ordering::SeqCst);

        let (vtx, vrx) = mpsc::channel();
        shared.callbacks.set_video(Arc::new(move |f: &VideoFrame, raw: &[u8]| {
            assert_eq!(raw, &f.data[..]);
            vtx.send((f.width, f.data.len(), raw.len())).unwrap();
        }));
        let (atx, arx) = mpsc::channel();
        shared.callbacks.set_audio(Arc::new(move |f: &AudioFrame, _raw: &[u8]| {
            atx.send((f.sample_rate, f.channels, f.samples.len())).unwrap();
        }));
        let gone = Arc::new(AtomicUsize::new(0));
        let g = Arc::clone(&gone);
        shared.callbacks.set_disconnect(Arc::new(move || {
            g.fetch_add(1, Ordering::SeqCst);
        }));

        let rx_thread = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                run_receiver(transport, shared, FORMAT, MAX_PAYLOAD_LEN, Arc::new(NoopLogSink))
            })
        };

        let codec = PacketCodec::default();
        let video = VideoFrame::synthetic(0, 320, 240, 70, 100, 1);
        let audio = AudioFrame::tone(0, 48_000, 2, 440.0, 64, 2);
        for (ty, payload) in [
            (PacketType::Ack, Vec::new()),
            (PacketType::VideoFrame, video.encode_payload()),
            (PacketType::AudioFrame, audio.encode_payload()),
            (PacketType::Disconnect, Vec::new()),
        ] {
            server.write_all(&codec.encode(ty, &payload).unwrap()).unwrap();
        }

        assert_eq!(
            vrx.recv_timeout(Duration::from_secs(2)).unwrap(),
            (320, 100, 100)
        );
        assert_eq!(
            arx.recv_timeout(Duration::from_secs(2)).unwrap(),
            (48_000, 2, 128)
        );
        rx_thread.join().unwrap();

        assert!(!shared.is_connected());
        shared.notify_disconnect();
        assert_eq!(gone.load(Ordering::SeqCst), 1);
        let stats = shared.stats.snapshot();
        assert_eq!(stats.video_frames, 1);
        assert_eq!(stats.audio_frames, 1);
        assert_eq!(stats.bytes_received, (4 * HEADER_LEN + 118 + 512) as u64);
    }

    #[test]
    fn foreign_bytes_end_the_loop() {
        let (transport, mut server) = wired();
        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::SeqCst);
        server.write_all(&[0xAB; 64]).unwrap();
        run_receiver(
            transport,
            Arc::clone(&shared),
            FORMAT,
            MAX_PAYLOAD_LEN,
            Arc::new(NoopLogSink),
        );
        assert!(!shared.is_connected());
    }
}
