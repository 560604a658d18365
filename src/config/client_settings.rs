use std::time::Duration;

use crate::config::Config;
use crate::protocol::constants::{DEFAULT_PORT, MAX_PAYLOAD_LEN};
use crate::protocol::{Capabilities, StreamConfig};

/// Tunables of the streaming client, read from the `[Client]` section.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server_addr: String,
    pub port: u16,
    pub client_name: String,
    pub capabilities: Capabilities,
    pub max_width: u16,
    pub max_height: u16,
    pub heartbeat_interval: Duration,
    pub handshake_timeout: Duration,
    pub max_payload: usize,
    /// Audio frames carry bare samples; these describe how to interpret them.
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            client_name: "streamcast-client".to_owned(),
            capabilities: Capabilities::VIDEO | Capabilities::AUDIO,
            max_width: 1920,
            max_height: 1080,
            heartbeat_interval: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            max_payload: MAX_PAYLOAD_LEN,
            audio_sample_rate: u32::from(StreamConfig::DEFAULT_AUDIO_SAMPLE_RATE),
            audio_channels: u16::from(StreamConfig::DEFAULT_AUDIO_CHANNELS),
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let hb_ms = u64::try_from(d.heartbeat_interval.as_millis()).unwrap_or(u64::MAX);
        let hs_ms = u64::try_from(d.handshake_timeout.as_millis()).unwrap_or(u64::MAX);
        Self {
            server_addr: config
                .get_or_default("Client", "server_addr", &d.server_addr)
                .to_owned(),
            port: config.get_parsed("Client", "port", d.port),
            client_name: config
                .get_or_default("Client", "client_name", &d.client_name)
                .to_owned(),
            capabilities: Capabilities::from_bits(config.get_parsed(
                "Client",
                "capabilities",
                d.capabilities.bits(),
            )),
            max_width: config.get_parsed("Client", "max_width", d.max_width),
            max_height: config.get_parsed("Client", "max_height", d.max_height),
            heartbeat_interval: Duration::from_millis(config.get_parsed(
                "Client",
                "heartbeat_interval_ms",
                hb_ms,
            )),
            handshake_timeout: Duration::from_millis(config.get_parsed(
                "Client",
                "handshake_timeout_ms",
                hs_ms,
            )),
            max_payload: config
                .get_parsed("Client", "max_payload", d.max_payload)
                .min(MAX_PAYLOAD_LEN),
            audio_sample_rate: config.get_parsed("Client", "audio_sample_rate", d.audio_sample_rate),
            audio_channels: config.get_parsed("Client", "audio_channels", d.audio_channels),
        }
    }

    /// `server_addr:port`, ready for `TcpStream::connect`.
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_addr, self.port)
    }
}
