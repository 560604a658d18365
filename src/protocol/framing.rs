use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::protocol::codec::PacketCodec;
use crate::protocol::constants::HEADER_LEN;
use crate::protocol::errors::FrameError;
use crate::protocol::header::PacketHeader;
use crate::protocol::packet_type::PacketType;

/// A validated header together with its complete payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

/// How to treat "no progress right now" (`WouldBlock` / `TimedOut`) mid-packet:
/// sleep for `backoff` and try again for as long as `keep_going` holds.
#[derive(Clone, Copy)]
pub struct Retry<'a> {
    pub backoff: Duration,
    pub keep_going: &'a dyn Fn() -> bool,
}

fn always() -> bool {
    true
}

impl Retry<'static> {
    /// Retries forever; only the stream itself can end the wait.
    pub fn blocking() -> Self {
        Retry {
            backoff: Duration::from_millis(1),
            keep_going: &always,
        }
    }
}

impl<'a> Retry<'a> {
    pub fn new(backoff: Duration, keep_going: &'a dyn Fn() -> bool) -> Self {
        Self {
            backoff,
            keep_going,
        }
    }

    fn wait(&self) -> io::Result<()> {
        if !(self.keep_going)() {
            return Err(io::Error::new(ErrorKind::ConnectionAborted, "stream stopped"));
        }
        thread::sleep(self.backoff);
        Ok(())
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Fills `buf` completely. A zero-length read is end-of-stream.
pub fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8], retry: Retry<'_>) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_transient(e.kind()) => retry.wait()?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn write_all_retrying<W: Write + ?Sized>(
    w: &mut W,
    buf: &[u8],
    retry: Retry<'_>,
) -> io::Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        match w.write(&buf[sent..]) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_transient(e.kind()) => retry.wait()?,
            Err(e) => return Err(e),
        }
    }
    loop {
        match w.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_transient(e.kind()) => retry.wait()?,
            Err(e) => return Err(e),
        }
    }
}

/// Stamps a header from `codec` and writes header + payload as one buffer.
pub fn write_packet<W: Write + ?Sized>(
    w: &mut W,
    codec: &PacketCodec,
    packet_type: PacketType,
    payload: &[u8],
    retry: Retry<'_>,
) -> Result<(), FrameError> {
    let header = codec.next_header(packet_type, payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    write_all_retrying(w, &buf, retry)?;
    Ok(())
}

/// Reads exactly one packet. The header is validated before any payload byte is read.
pub fn read_packet<R: Read + ?Sized>(
    r: &mut R,
    max_payload: usize,
    retry: Retry<'_>,
) -> Result<Packet, FrameError> {
    let mut head = [0u8; HEADER_LEN];
    read_full(r, &mut head, retry)?;
    finish_packet(r, &head, max_payload, retry)
}

/// Non-blocking variant: `Ok(None)` when no byte of a new packet is available yet.
/// Once the first byte has arrived the rest is read with `retry`.
pub fn try_read_packet<R: Read + ?Sized>(
    r: &mut R,
    max_payload: usize,
    retry: Retry<'_>,
) -> Result<Option<Packet>, FrameError> {
    let mut head = [0u8; HEADER_LEN];
    let first = loop {
        match r.read(&mut head) {
            Ok(0) => return Err(FrameError::Io(ErrorKind::UnexpectedEof.into())),
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_transient(e.kind()) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    };
    read_full(r, &mut head[first..], retry)?;
    finish_packet(r, &head, max_payload, retry).map(Some)
}

fn finish_packet<R: Read + ?Sized>(
    r: &mut R,
    head: &[u8; HEADER_LEN],
    max_payload: usize,
    retry: Retry<'_>,
) -> Result<Packet, FrameError> {
    let header = PacketHeader::decode(head, max_payload)?;
    let mut payload = vec![0u8; header.payload_len()];
    read_full(r, &mut payload, retry)?;
    Ok(Packet {
        header,
        payload: Bytes::from(payload),
    })
}
