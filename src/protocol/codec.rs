use crate::clock::now_micros;
use crate::protocol::constants::{HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::protocol::errors::ProtocolError;
use crate::protocol::header::PacketHeader;
use crate::protocol::packet_type::PacketType;
use crate::protocol::sequence::SequenceCounter;

/// Pure header+payload transform for one sending direction of one connection.
///
/// The only state is the sequence counter, so two connections never contend
/// and decoding is fully stateless.
#[derive(Debug)]
pub struct PacketCodec {
    sequence: SequenceCounter,
    max_payload: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_LEN)
    }
}

impl PacketCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            sequence: SequenceCounter::new(),
            max_payload: max_payload.min(MAX_PAYLOAD_LEN),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Stamps a fresh header for a payload of `payload_len` bytes, consuming
    /// one sequence number.
    pub fn next_header(
        &self,
        packet_type: PacketType,
        payload_len: usize,
    ) -> Result<PacketHeader, ProtocolError> {
        if payload_len > self.max_payload {
            return Err(ProtocolError::Oversized {
                declared: payload_len,
                max: self.max_payload,
            });
        }
        let size = u32::try_from(payload_len).map_err(|_| ProtocolError::Oversized {
            declared: payload_len,
            max: self.max_payload,
        })?;
        Ok(PacketHeader::new(
            packet_type,
            size,
            self.sequence.next(),
            now_micros(),
        ))
    }

    /// Header + payload as one contiguous buffer.
    pub fn encode(
        &self,
        packet_type: PacketType,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let header = self.next_header(packet_type, payload.len())?;
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(payload);
        Ok(out)
    }

    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<(PacketHeader, &'a [u8]), ProtocolError> {
        decode(bytes, self.max_payload)
    }
}

/// Splits one packet off the front of `bytes`. Trailing bytes beyond the
/// declared payload are ignored; nothing is returned on failure.
pub fn decode(bytes: &[u8], max_payload: usize) -> Result<(PacketHeader, &[u8]), ProtocolError> {
    let header = PacketHeader::decode(bytes, max_payload)?;
    let end = HEADER_LEN + header.payload_len();
    if bytes.len() < end {
        return Err(ProtocolError::Truncated {
            expected: end,
            actual: bytes.len(),
        });
    }
    Ok((header, &bytes[HEADER_LEN..end]))
}
