/// Wire constants.
///
/// Header (24 bytes, little-endian, no padding):
///   [magic: u32][version: u8][packet_type: u8][flags: u16]
///   [payload_size: u32][sequence_number: u32][timestamp_us: u64]
/// Payload:
///   [payload bytes...], up to `MAX_PAYLOAD_LEN`.
pub const MAGIC: u32 = 0x5343_524E;

pub const PROTOCOL_VERSION: u8 = 1;

pub const HEADER_LEN: usize = 24;

/// Hard ceiling on a single payload (64 KiB).
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

pub const DEFAULT_PORT: u16 = 9999;

/// Fixed text field widths, NUL padded.
pub const CLIENT_NAME_LEN: usize = 64;
pub const SERVER_INFO_LEN: usize = 128;

pub const HANDSHAKE_REQUEST_LEN: usize = CLIENT_NAME_LEN + 1 + 2 + 2;
pub const HANDSHAKE_RESPONSE_LEN: usize = 1 + 2 + SERVER_INFO_LEN;
pub const STREAM_CONFIG_LEN: usize = 2 + 1 + 2 + 1 + 1 + 1;

/// frame number, width, height, quality, padding, timestamp
pub const VIDEO_SUBHEADER_LEN: usize = 4 + 2 + 2 + 1 + 1 + 8;
