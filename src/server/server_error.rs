use std::sync::PoisonError;
use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum ServerError {
    AlreadyRunning,
    Bind(io::Error),
    Io(io::Error),
    Poisoned,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ServerError::*;
        match self {
            AlreadyRunning => write!(f, "server is already running"),
            Bind(e) => write!(f, "bind/listen failed: {e}"),
            Io(e) => write!(f, "IO error: {e}"),
            Poisoned => write!(f, "server state lock poisoned"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bind(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl<T> From<PoisonError<T>> for ServerError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}
