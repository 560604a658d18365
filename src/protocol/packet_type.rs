use std::fmt;

use crate::protocol::errors::ProtocolError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Handshake = 0x01,
    VideoFrame = 0x02,
    AudioFrame = 0x03,
    Disconnect = 0x04,
    Config = 0x05,
    Heartbeat = 0x06,
    Ack = 0x07,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Result<PacketType, ProtocolError> {
        use PacketType::*;
        match v {
            0x01 => Ok(Handshake),
            0x02 => Ok(VideoFrame),
            0x03 => Ok(AudioFrame),
            0x04 => Ok(Disconnect),
            0x05 => Ok(Config),
            0x06 => Ok(Heartbeat),
            0x07 => Ok(Ack),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Control packets carry no payload.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            PacketType::Disconnect | PacketType::Heartbeat | PacketType::Ack
        )
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Handshake => "HANDSHAKE",
            PacketType::VideoFrame => "VIDEO_FRAME",
            PacketType::AudioFrame => "AUDIO_FRAME",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::Config => "CONFIG",
            PacketType::Heartbeat => "HEARTBEAT",
            PacketType::Ack => "ACK",
        };
        f.write_str(name)
    }
}
