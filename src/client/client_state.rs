use std::fmt;

/// `Disconnected -> Connecting -> Handshaking -> Connected -> Disconnecting -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
    Disconnecting,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connecting => "connecting",
            ClientState::Handshaking => "handshaking",
            ClientState::Connected => "connected",
            ClientState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}
