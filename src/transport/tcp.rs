use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use super::{Transport, Upgrader};

impl Transport for TcpStream {
    fn try_clone_box(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

/// Clear-text TCP, Nagle off.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTcp;

impl Upgrader for PlainTcp {
    fn upgrade(&self, stream: TcpStream) -> io::Result<Box<dyn Transport>> {
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn pair() -> (Box<dyn Transport>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (PlainTcp.upgrade(server).unwrap(), client)
    }

    #[test]
    fn clones_share_one_connection() {
        let (mut t, mut peer) = pair();
        let mut clone = t.try_clone_box().unwrap();
        clone.write_all(b"ping").unwrap();

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").unwrap();
        t.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
        assert_eq!(t.peer_addr().unwrap(), peer.local_addr().unwrap());
    }

    #[test]
    fn shutdown_wakes_a_blocked_reader() {
        let (t, _peer) = pair();
        let mut reader = t.try_clone_box().unwrap();
        let (tx, rx) = mpsc::channel();
        let h = thread::spawn(move || {
            let mut buf = [0u8; 1];
            tx.send(reader.read(&mut buf).map_err(|e| e.kind())).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        t.shutdown().unwrap();
        let res = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(res, Ok(0) | Err(_)));
        h.join().unwrap();
    }

    #[test]
    fn nonblocking_read_reports_would_block() {
        let (mut t, _peer) = pair();
        t.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 1];
        let err = t.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
