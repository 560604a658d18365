use byteorder::{ByteOrder, LittleEndian};

use crate::protocol::constants::{HEADER_LEN, MAGIC, PROTOCOL_VERSION};
use crate::protocol::errors::ProtocolError;
use crate::protocol::packet_type::PacketType;

/// Fixed 24-byte packet header. All multi-byte fields are little-endian.
///
/// `packet_type` is kept as the raw byte so a receiver can skip types it
/// does not know without dropping the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u8,
    pub packet_type: u8,
    pub flags: u16,
    pub payload_size: u32,
    pub sequence_number: u32,
    /// Send time, microseconds since the UNIX epoch.
    pub timestamp: u64,
}

impl PacketHeader {
    pub fn new(
        packet_type: PacketType,
        payload_size: u32,
        sequence_number: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            packet_type: packet_type.as_u8(),
            flags: 0,
            payload_size,
            sequence_number,
            timestamp,
        }
    }

    pub fn kind(&self) -> Result<PacketType, ProtocolError> {
        PacketType::from_u8(self.packet_type)
    }

    pub fn payload_len(&self) -> usize {
        self.payload_size as usize
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut b = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut b[0..4], self.magic);
        b[4] = self.version;
        b[5] = self.packet_type;
        LittleEndian::write_u16(&mut b[6..8], self.flags);
        LittleEndian::write_u32(&mut b[8..12], self.payload_size);
        LittleEndian::write_u32(&mut b[12..16], self.sequence_number);
        LittleEndian::write_u64(&mut b[16..24], self.timestamp);
        b
    }

    /// Parses and validates a header from the front of `bytes`.
    ///
    /// Checks run in wire order: magic first (so a foreign stream is always
    /// reported as `BadMagic`), then length, version and the payload bound.
    /// The payload itself is never touched.
    pub fn decode(bytes: &[u8], max_payload: usize) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let magic = LittleEndian::read_u32(&bytes[0..4]);
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let header = Self {
            magic,
            version: bytes[4],
            packet_type: bytes[5],
            flags: LittleEndian::read_u16(&bytes[6..8]),
            payload_size: LittleEndian::read_u32(&bytes[8..12]),
            sequence_number: LittleEndian::read_u32(&bytes[12..16]),
            timestamp: LittleEndian::read_u64(&bytes[16..24]),
        };

        if header.version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }
        if header.payload_len() > max_payload {
            return Err(ProtocolError::Oversized {
                declared: header.payload_len(),
                max: max_payload,
            });
        }
        Ok(header)
    }
}
