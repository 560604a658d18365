use std::{error::Error, fmt, io};

/// Violations of the wire contract. Any of these ends the affected connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    BadMagic(u32),
    UnsupportedVersion(u8),
    UnknownType(u8),
    Oversized { declared: usize, max: usize },
    Truncated { expected: usize, actual: usize },
    InvalidPayload(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProtocolError::*;
        match self {
            BadMagic(m) => write!(f, "bad magic {m:#010x}"),
            UnsupportedVersion(v) => write!(f, "unsupported protocol version {v}"),
            UnknownType(t) => write!(f, "unknown packet type {t:#04x}"),
            Oversized { declared, max } => {
                write!(f, "payload of {declared} bytes exceeds maximum of {max}")
            }
            Truncated { expected, actual } => {
                write!(f, "truncated: needed {expected} bytes, had {actual}")
            }
            InvalidPayload(why) => write!(f, "invalid payload: {why}"),
        }
    }
}

impl Error for ProtocolError {}

/// Stream-level failure while reading or writing a packet: transport vs. contract.
#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    Protocol(ProtocolError),
}

impl FrameError {
    /// True when the peer closed the stream cleanly between packets.
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl Error for FrameError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Protocol(e) => Some(e),
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for FrameError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
