use std::sync::PoisonError;
use std::{error::Error, fmt, io};

use crate::handshake::HandshakeError;
use crate::protocol::FrameError;

#[derive(Debug)]
pub enum ClientError {
    AlreadyConnected,
    NotConnected,
    Connect(io::Error),
    Handshake(HandshakeError),
    Frame(FrameError),
    Poisoned,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnected => write!(f, "client is already connected"),
            Self::NotConnected => write!(f, "client is not connected"),
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Handshake(e) => write!(f, "{e}"),
            Self::Frame(e) => write!(f, "send failed: {e}"),
            Self::Poisoned => write!(f, "client lock poisoned"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connect(e) => Some(e),
            Self::Handshake(e) => Some(e),
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HandshakeError> for ClientError {
    fn from(e: HandshakeError) -> Self {
        Self::Handshake(e)
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl<T> From<PoisonError<T>> for ClientError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}
