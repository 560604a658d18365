//! Byte-stream abstraction under the packet layer.
//!
//! Sessions and the client only ever see a `Box<dyn Transport>`; whether the
//! bytes travel in clear TCP or inside TLS is decided once, by the [`Upgrader`]
//! that wraps each freshly accepted or connected socket.

pub mod pem;
mod tcp;
pub mod tls;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

pub use tcp::PlainTcp;
pub use tls::{TlsClientUpgrader, TlsServerUpgrader, TlsSettings};

/// A connected, bidirectional byte stream.
///
/// Clones share the underlying connection: one clone reads while another writes,
/// and `shutdown` on any of them wakes every blocked reader.
pub trait Transport: Read + Write + Send {
    fn try_clone_box(&self) -> io::Result<Box<dyn Transport>>;

    fn shutdown(&self) -> io::Result<()>;

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

/// Wraps a raw socket into the transport both sides will speak over.
pub trait Upgrader: Send + Sync {
    fn upgrade(&self, stream: TcpStream) -> io::Result<Box<dyn Transport>>;
}

/// Server-side upgrader from `[TLS]`: TLS when enabled, plain TCP otherwise.
///
/// # Errors
///
/// Returns an `io::Error` if TLS is enabled but the certificate or key cannot be loaded.
pub fn server_upgrader(config: &Config) -> io::Result<Arc<dyn Upgrader>> {
    let tls = TlsSettings::from_config(config);
    if !tls.enabled {
        return Ok(Arc::new(PlainTcp));
    }
    Ok(Arc::new(TlsServerUpgrader::from_settings(&tls)?))
}

/// Client-side counterpart of [`server_upgrader`].
///
/// # Errors
///
/// Returns an `io::Error` if TLS is enabled but the CA or domain is unusable.
pub fn client_upgrader(config: &Config) -> io::Result<Arc<dyn Upgrader>> {
    let tls = TlsSettings::from_config(config);
    if !tls.enabled {
        return Ok(Arc::new(PlainTcp));
    }
    Ok(Arc::new(TlsClientUpgrader::from_settings(&tls)?))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn tls_is_off_unless_asked_for() {
        let cfg = Config::parse("[TLS]\ncert = missing.pem\n");
        assert!(server_upgrader(&cfg).is_ok());
        assert!(client_upgrader(&cfg).is_ok());

        let on = Config::parse("[TLS]\nenabled = true\ncert = /nonexistent/cert.pem\n");
        assert!(server_upgrader(&on).is_err());
    }
}
