use std::f32::consts::TAU;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

use crate::protocol::constants::VIDEO_SUBHEADER_LEN;
use crate::protocol::errors::ProtocolError;
use crate::protocol::header::PacketHeader;
use crate::protocol::packet_type::PacketType;
use crate::protocol::wire::{Cursor, put_u8, put_u16, put_u32, put_u64};

/// Which half of the stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn packet_type(self) -> PacketType {
        match self {
            MediaKind::Video => PacketType::VideoFrame,
            MediaKind::Audio => PacketType::AudioFrame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub frame_number: u32,
    pub width: u16,
    pub height: u16,
    pub quality: u8,
    /// Opaque encoded pixels; the protocol never looks inside.
    pub data: Bytes,
    /// Capture time, microseconds since the UNIX epoch.
    pub timestamp: u64,
}

impl VideoFrame {
    /// Wire payload: 18-byte sub-header followed by `data`.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(VIDEO_SUBHEADER_LEN + self.data.len());
        put_u32(&mut buf, self.frame_number);
        put_u16(&mut buf, self.width);
        put_u16(&mut buf, self.height);
        put_u8(&mut buf, self.quality);
        put_u8(&mut buf, 0);
        put_u64(&mut buf, self.timestamp);
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(payload);
        let frame_number = c.get_u32()?;
        let width = c.get_u16()?;
        let height = c.get_u16()?;
        let quality = c.get_u8()?;
        let _padding = c.get_u8()?;
        let timestamp = c.get_u64()?;
        Ok(Self {
            frame_number,
            width,
            height,
            quality,
            data: Bytes::copy_from_slice(c.rest()),
            timestamp,
        })
    }

    /// Deterministic test pattern standing in for a capture device.
    pub fn synthetic(
        frame_number: u32,
        width: u16,
        height: u16,
        quality: u8,
        len: usize,
        timestamp: u64,
    ) -> Self {
        let shift = frame_number as usize;
        let data: Vec<u8> = (0..len).map(|i| ((i + shift) % 256) as u8).collect();
        Self {
            frame_number,
            width,
            height,
            quality,
            data: Bytes::from(data),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub frame_number: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved when `channels > 1`.
    pub samples: Vec<f32>,
    pub timestamp: u64,
}

impl AudioFrame {
    /// Wire payload: bare little-endian f32 samples, nothing else.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.samples.len() * 4];
        LittleEndian::write_f32_into(&self.samples, &mut buf);
        buf
    }

    pub fn decode_samples(payload: &[u8]) -> Result<Vec<f32>, ProtocolError> {
        if payload.len() % 4 != 0 {
            return Err(ProtocolError::InvalidPayload("audio payload is not whole f32 samples"));
        }
        let mut samples = vec![0f32; payload.len() / 4];
        LittleEndian::read_f32_into(payload, &mut samples);
        Ok(samples)
    }

    /// Rebuilds a frame on the receiving side. The payload carries only samples,
    /// so numbering and timing come from the packet header and the format from
    /// the receiver's own settings.
    pub fn from_packet(
        header: &PacketHeader,
        payload: &[u8],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            frame_number: header.sequence_number,
            sample_rate,
            channels,
            samples: Self::decode_samples(payload)?,
            timestamp: header.timestamp,
        })
    }

    /// Sine tone, `samples_per_channel` frames long, phase-continuous across frame numbers.
    pub fn tone(
        frame_number: u32,
        sample_rate: u32,
        channels: u16,
        frequency: f32,
        samples_per_channel: usize,
        timestamp: u64,
    ) -> Self {
        let channels_n = usize::from(channels.max(1));
        let start = u64::from(frame_number) * samples_per_channel as u64;
        let rate = sample_rate.max(1) as f32;
        let mut samples = Vec::with_capacity(samples_per_channel * channels_n);
        for i in 0..samples_per_channel {
            let t = ((start + i as u64) % u64::from(sample_rate.max(1))) as f32 / rate;
            let v = 0.25 * (TAU * frequency * t).sin();
            samples.extend(std::iter::repeat_n(v, channels_n));
        }
        Self {
            frame_number,
            sample_rate,
            channels,
            samples,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn video_payload_prefixes_sub_header() {
        let frame = VideoFrame::synthetic(7, 1280, 720, 80, 1000, 42);
        let payload = frame.encode_payload();
        assert_eq!(payload.len(), VIDEO_SUBHEADER_LEN + 1000);
        assert_eq!(&payload[0..4], &7u32.to_le_bytes());
        assert_eq!(payload[9], 0);
        assert_eq!(VideoFrame::decode_payload(&payload).unwrap(), frame);
    }

    #[test]
    fn video_payload_shorter_than_sub_header_is_truncated() {
        assert!(matches!(
            VideoFrame::decode_payload(&[0u8; VIDEO_SUBHEADER_LEN - 1]),
            Err(ProtocolError::Truncated { .. })
        ));
        let empty = VideoFrame::decode_payload(&[0u8; VIDEO_SUBHEADER_LEN]).unwrap();
        assert!(empty.data.is_empty());
    }

    #[test]
    fn audio_payload_is_bare_samples() {
        let frame = AudioFrame::tone(3, 44_100, 2, 440.0, 128, 9);
        assert_eq!(frame.samples.len(), 256);
        let payload = frame.encode_payload();
        assert_eq!(payload.len(), 256 * 4);
        assert_eq!(AudioFrame::decode_samples(&payload).unwrap(), frame.samples);
        assert!(AudioFrame::decode_samples(&payload[..5]).is_err());
    }

    #[test]
    fn audio_frame_takes_numbering_from_header() {
        let header = PacketHeader::new(PacketType::AudioFrame, 8, 11, 5_000);
        let payload = AudioFrame {
            frame_number: 0,
            sample_rate: 0,
            channels: 0,
            samples: vec![0.5, -0.5],
            timestamp: 0,
        }
        .encode_payload();
        let rebuilt = AudioFrame::from_packet(&header, &payload, 48_000, 2).unwrap();
        assert_eq!(rebuilt.frame_number, 11);
        assert_eq!(rebuilt.timestamp, 5_000);
        assert_eq!(rebuilt.sample_rate, 48_000);
        assert_eq!(rebuilt.samples, vec![0.5, -0.5]);
    }
}
