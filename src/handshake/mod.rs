//! The opening request/response exchange.
//!
//! The client sends one HANDSHAKE carrying a [`HandshakeRequest`]; the server
//! answers with one HANDSHAKE carrying a [`HandshakeResponse`]. Anything else
//! in either direction fails the exchange and the connection is dropped.

mod handshake_error;

pub use handshake_error::HandshakeError;

use std::io::{Read, Write};

use crate::protocol::{
    HANDSHAKE_REQUEST_LEN, HANDSHAKE_RESPONSE_LEN, HandshakeRequest, HandshakeResponse, Packet,
    PacketCodec, PacketType, Retry, read_packet, write_packet,
};

fn expect_handshake(packet: &Packet, min_len: usize) -> Result<(), HandshakeError> {
    let kind = packet.header.kind()?;
    if kind != PacketType::Handshake {
        return Err(HandshakeError::UnexpectedType(kind));
    }
    if packet.payload.len() < min_len {
        return Err(HandshakeError::Undersized {
            expected: min_len,
            actual: packet.payload.len(),
        });
    }
    Ok(())
}

/// Server side, step 1: wait for the client's request.
pub fn read_request<R: Read + ?Sized>(
    r: &mut R,
    max_payload: usize,
    retry: Retry<'_>,
) -> Result<HandshakeRequest, HandshakeError> {
    let packet = read_packet(r, max_payload, retry)?;
    expect_handshake(&packet, HANDSHAKE_REQUEST_LEN)?;
    Ok(HandshakeRequest::decode(&packet.payload)?)
}

/// Server side, step 2.
pub fn send_response<W: Write + ?Sized>(
    w: &mut W,
    codec: &PacketCodec,
    response: &HandshakeResponse,
    retry: Retry<'_>,
) -> Result<(), HandshakeError> {
    write_packet(w, codec, PacketType::Handshake, &response.encode(), retry)?;
    Ok(())
}

/// Client side: one request, one response, no retry. A rejection is an error.
pub fn perform<S: Read + Write + ?Sized>(
    stream: &mut S,
    codec: &PacketCodec,
    request: &HandshakeRequest,
    max_payload: usize,
    retry: Retry<'_>,
) -> Result<HandshakeResponse, HandshakeError> {
    write_packet(stream, codec, PacketType::Handshake, &request.encode(), retry)?;
    let packet = read_packet(stream, max_payload, retry)?;
    expect_handshake(&packet, HANDSHAKE_RESPONSE_LEN)?;
    let response = HandshakeResponse::decode(&packet.payload)?;
    if !response.accepted {
        return Err(HandshakeError::Rejected(response.server_info));
    }
    Ok(response)
}
