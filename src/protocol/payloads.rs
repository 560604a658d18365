use std::ops::BitOr;

use crate::protocol::constants::{
    CLIENT_NAME_LEN, HANDSHAKE_REQUEST_LEN, HANDSHAKE_RESPONSE_LEN, SERVER_INFO_LEN,
    STREAM_CONFIG_LEN,
};
use crate::protocol::errors::ProtocolError;
use crate::protocol::media::MediaKind;
use crate::protocol::wire::{Cursor, put_fixed_str, put_u8, put_u16};

/// Client-declared media wishes. Bit 0 = video, bit 1 = audio; other bits are carried but ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const VIDEO: Capabilities = Capabilities(0b01);
    pub const AUDIO: Capabilities = Capabilities(0b10);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn wants_video(self) -> bool {
        self.0 & Self::VIDEO.0 != 0
    }

    pub fn wants_audio(self) -> bool {
        self.0 & Self::AUDIO.0 != 0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        Capabilities(self.0 | rhs.0)
    }
}

/// First packet a client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub client_name: String,
    pub capabilities: Capabilities,
    pub max_width: u16,
    pub max_height: u16,
}

impl HandshakeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_REQUEST_LEN);
        put_fixed_str(&mut buf, &self.client_name, CLIENT_NAME_LEN);
        put_u8(&mut buf, self.capabilities.bits());
        put_u16(&mut buf, self.max_width);
        put_u16(&mut buf, self.max_height);
        buf
    }

    /// Trailing bytes are tolerated so newer clients can append fields.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            client_name: c.get_fixed_str(CLIENT_NAME_LEN)?,
            capabilities: Capabilities::from_bits(c.get_u8()?),
            max_width: c.get_u16()?,
            max_height: c.get_u16()?,
        })
    }
}

/// Server's answer to a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub accepted: bool,
    pub assigned_id: u16,
    pub server_info: String,
}

impl HandshakeResponse {
    pub fn accept(assigned_id: u16, server_info: &str) -> Self {
        Self {
            accepted: true,
            assigned_id,
            server_info: server_info.to_owned(),
        }
    }

    pub fn reject(reason: &str) -> Self {
        Self {
            accepted: false,
            assigned_id: 0,
            server_info: reason.to_owned(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_RESPONSE_LEN);
        put_u8(&mut buf, u8::from(self.accepted));
        put_u16(&mut buf, self.assigned_id);
        put_fixed_str(&mut buf, &self.server_info, SERVER_INFO_LEN);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        Ok(Self {
            accepted: c.get_u8()? != 0,
            assigned_id: c.get_u16()?,
            server_info: c.get_fixed_str(SERVER_INFO_LEN)?,
        })
    }
}

/// Per-session media settings. Derived at handshake, replaced by CONFIG packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub fps: u16,
    pub jpeg_quality: u8,
    pub audio_sample_rate: u16,
    pub audio_channels: u8,
    pub enable_audio: bool,
    pub enable_video: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: Self::DEFAULT_FPS,
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
            audio_sample_rate: Self::DEFAULT_AUDIO_SAMPLE_RATE,
            audio_channels: Self::DEFAULT_AUDIO_CHANNELS,
            enable_audio: true,
            enable_video: true,
        }
    }
}

impl StreamConfig {
    pub const DEFAULT_FPS: u16 = 30;
    pub const DEFAULT_JPEG_QUALITY: u8 = 80;
    pub const DEFAULT_AUDIO_SAMPLE_RATE: u16 = 44_100;
    pub const DEFAULT_AUDIO_CHANNELS: u8 = 1;

    /// Defaults with each media switched on iff the client asked for it.
    pub fn from_capabilities(caps: Capabilities) -> Self {
        Self {
            enable_video: caps.wants_video(),
            enable_audio: caps.wants_audio(),
            ..Self::default()
        }
    }

    pub fn enables(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => self.enable_video,
            MediaKind::Audio => self.enable_audio,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STREAM_CONFIG_LEN);
        put_u16(&mut buf, self.fps);
        put_u8(&mut buf, self.jpeg_quality);
        put_u16(&mut buf, self.audio_sample_rate);
        put_u8(&mut buf, self.audio_channels);
        put_u8(&mut buf, u8::from(self.enable_audio));
        put_u8(&mut buf, u8::from(self.enable_video));
        buf
    }

    /// Requires exactly [`STREAM_CONFIG_LEN`] bytes; a CONFIG of any other size is ignored by receivers.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() != STREAM_CONFIG_LEN {
            return Err(ProtocolError::InvalidPayload("stream config size mismatch"));
        }
        let mut c = Cursor::new(payload);
        Ok(Self {
            fps: c.get_u16()?,
            jpeg_quality: c.get_u8()?,
            audio_sample_rate: c.get_u16()?,
            audio_channels: c.get_u8()?,
            enable_audio: c.get_u8()? != 0,
            enable_video: c.get_u8()? != 0,
        })
    }
}
