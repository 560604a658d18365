//! Wire format: the fixed 24-byte header, typed payloads and stream framing.
//!
//! Every multi-byte field, in headers and payloads alike, is little-endian.

pub mod codec;
pub mod constants;
pub mod errors;
pub mod framing;
pub mod header;
pub mod media;
pub mod packet_type;
pub mod payloads;
pub mod sequence;
mod wire;

pub use codec::{PacketCodec, decode};
pub use constants::*;
pub use errors::{FrameError, ProtocolError};
pub use framing::{Packet, Retry, read_packet, try_read_packet, write_packet};
pub use header::PacketHeader;
pub use media::{AudioFrame, MediaKind, VideoFrame};
pub use packet_type::PacketType;
pub use payloads::{Capabilities, HandshakeRequest, HandshakeResponse, StreamConfig};
pub use sequence::SequenceCounter;
