use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use super::client_session::{ClientSession, Outbound};
use crate::log::LogSink;
use crate::protocol::{PacketCodec, Retry, write_packet};
use crate::transport::Transport;
use crate::{sink_info, sink_warn};

/// Drains one session's queue onto its socket, in order.
///
/// Ends when the queue's sender is dropped and everything queued is written,
/// or on the first write failure. A write that cannot make progress is
/// abandoned once the session is no longer active.
pub(crate) fn run_writer(
    session: Arc<ClientSession>,
    mut transport: Box<dyn Transport>,
    codec: PacketCodec,
    queue: Receiver<Outbound>,
    backoff: Duration,
    log: Arc<dyn LogSink>,
) {
    let keep_going = || session.is_active();
    let mut written: u64 = 0;

    while let Ok(packet) = queue.recv() {
        let retry = Retry::new(backoff, &keep_going);
        if let Err(e) = write_packet(
            &mut *transport,
            &codec,
            packet.packet_type,
            &packet.payload,
            retry,
        ) {
            sink_warn!(
                log,
                "[session {}] write of {} failed: {}",
                session.id(),
                packet.packet_type,
                e
            );
            session.deactivate();
            break;
        }
        written += 1;
    }

    sink_info!(log, "[session {}] writer done after {} packets", session.id(), written);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::protocol::{Capabilities, MAX_PAYLOAD_LEN, PacketType, read_packet};
    use crate::server::client_session::tests::session_with;
    use crate::transport::PlainTcp;
    use crate::transport::Upgrader;
    use bytes::Bytes;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[test]
    fn queued_packets_arrive_in_order_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let transport = PlainTcp.upgrade(accepted).unwrap();

        let (session, rx) = session_with(5, Capabilities::VIDEO, 8);
        let session = Arc::new(session);
        session
            .enqueue(Outbound {
                packet_type: PacketType::VideoFrame,
                payload: Bytes::from_static(&[1, 2, 3]),
            })
            .unwrap();
        session.enqueue(Outbound::control(PacketType::Disconnect)).unwrap();
        session.close_outbound();

        let writer = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                run_writer(
                    session,
                    transport,
                    PacketCodec::default(),
                    rx,
                    Duration::from_millis(1),
                    Arc::new(NoopLogSink),
                )
            })
        };
        writer.join().unwrap();

        let first = read_packet(&mut peer, MAX_PAYLOAD_LEN, Retry::blocking()).unwrap();
        let second = read_packet(&mut peer, MAX_PAYLOAD_LEN, Retry::blocking()).unwrap();
        assert_eq!(first.header.kind(), Ok(PacketType::VideoFrame));
        assert_eq!(&first.payload[..], &[1, 2, 3]);
        assert_eq!(second.header.kind(), Ok(PacketType::Disconnect));
        assert_eq!(second.header.sequence_number, first.header.sequence_number + 1);
    }
}
