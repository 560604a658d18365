use std::{error::Error, fmt, io};

use crate::protocol::{FrameError, PacketType, ProtocolError};

#[derive(Debug)]
pub enum HandshakeError {
    Frame(FrameError),
    UnexpectedType(PacketType),
    Undersized { expected: usize, actual: usize },
    /// The server answered with `accepted = 0`; carries its reason text.
    Rejected(String),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "handshake framing failed: {e}"),
            Self::UnexpectedType(t) => write!(f, "expected HANDSHAKE, got {t}"),
            Self::Undersized { expected, actual } => {
                write!(f, "handshake payload too small: {actual} < {expected} bytes")
            }
            Self::Rejected(reason) => write!(f, "handshake rejected: {reason}"),
        }
    }
}

impl Error for HandshakeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for HandshakeError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<ProtocolError> for HandshakeError {
    fn from(e: ProtocolError) -> Self {
        Self::Frame(FrameError::Protocol(e))
    }
}

impl From<io::Error> for HandshakeError {
    fn from(e: io::Error) -> Self {
        Self::Frame(FrameError::Io(e))
    }
}
