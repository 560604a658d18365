use std::time::Duration;

use crate::config::Config;
use crate::protocol::constants::{DEFAULT_PORT, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};

/// Tunables of the broadcast server, read from the `[Server]` section.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
    /// Sessions beyond this count are answered with a rejected handshake.
    pub max_clients: usize,
    /// Largest payload accepted from, or sent to, a peer.
    pub max_payload: usize,
    pub heartbeat_scan_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Upper bound on how long a fresh connection may take to send its handshake.
    pub handshake_timeout: Duration,
    /// Capacity of each session's outbound queue; a full queue drops frames.
    pub outbound_queue_len: usize,
    pub server_info: String,
    /// Sleep between non-blocking read attempts in the session loop.
    pub poll_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            max_clients: 10,
            max_payload: MAX_PAYLOAD_LEN,
            heartbeat_scan_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(5),
            outbound_queue_len: 64,
            server_info: format!("StreamServer v{PROTOCOL_VERSION}"),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        Self {
            bind_addr: config
                .get_or_default("Server", "bind_addr", &d.bind_addr)
                .to_owned(),
            port: config.get_parsed("Server", "port", d.port),
            max_clients: config.get_parsed("Server", "max_clients", d.max_clients),
            max_payload: config
                .get_parsed("Server", "max_payload", d.max_payload)
                .min(MAX_PAYLOAD_LEN),
            heartbeat_scan_interval: millis(config, "heartbeat_scan_interval_ms", d.heartbeat_scan_interval),
            heartbeat_timeout: millis(config, "heartbeat_timeout_ms", d.heartbeat_timeout),
            handshake_timeout: millis(config, "handshake_timeout_ms", d.handshake_timeout),
            outbound_queue_len: config
                .get_parsed("Server", "outbound_queue_len", d.outbound_queue_len)
                .max(1),
            server_info: config
                .get_or_default("Server", "server_info", &d.server_info)
                .to_owned(),
            poll_interval: millis(config, "poll_interval_ms", d.poll_interval),
        }
    }

    /// `bind_addr:port`, ready for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn millis(config: &Config, key: &str, default: Duration) -> Duration {
    let ms = config.get_parsed("Server", key, u64::try_from(default.as_millis()).unwrap_or(u64::MAX));
    Duration::from_millis(ms)
}
