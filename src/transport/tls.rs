use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection, StreamOwned};

use super::pem::{load_certs, load_pinned_roots, load_private_key};
use super::{Transport, Upgrader};
use crate::config::Config;

/// Longest a reader may hold the shared TLS stream before giving writers a turn.
pub const DEFAULT_READ_SLICE: Duration = Duration::from_millis(20);

/// `[TLS]` section.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub enabled: bool,
    pub cert: String,
    pub key: String,
    /// CA the client pins; the server's certificate must chain to it.
    pub ca: String,
    /// Name the client expects in the server certificate.
    pub domain: String,
    pub read_slice: Duration,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cert: "certs/stream/cert.pem".to_owned(),
            key: "certs/stream/key.pem".to_owned(),
            ca: "certs/stream/rootCA.pem".to_owned(),
            domain: "stream.internal".to_owned(),
            read_slice: DEFAULT_READ_SLICE,
        }
    }
}

impl TlsSettings {
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let slice_ms = config.get_parsed("TLS", "read_slice_ms", 20u64).max(1);
        Self {
            enabled: config.get_bool("TLS", "enabled", d.enabled),
            cert: config.get_non_empty("TLS", "cert").unwrap_or(&d.cert).to_owned(),
            key: config.get_non_empty("TLS", "key").unwrap_or(&d.key).to_owned(),
            ca: config.get_non_empty("TLS", "ca").unwrap_or(&d.ca).to_owned(),
            domain: config.get_non_empty("TLS", "domain").unwrap_or(&d.domain).to_owned(),
            read_slice: Duration::from_millis(slice_ms),
        }
    }
}

enum TlsStream {
    Client(StreamOwned<ClientConnection, TcpStream>),
    Server(StreamOwned<ServerConnection, TcpStream>),
}

impl TlsStream {
    fn send_close_notify(&mut self) {
        match self {
            TlsStream::Client(s) => s.conn.send_close_notify(),
            TlsStream::Server(s) => s.conn.send_close_notify(),
        }
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TlsStream::Client(s) => s.read(buf),
            TlsStream::Server(s) => s.read(buf),
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TlsStream::Client(s) => s.write(buf),
            TlsStream::Server(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TlsStream::Client(s) => s.flush(),
            TlsStream::Server(s) => s.flush(),
        }
    }
}

/// One rustls session shared by every clone.
///
/// Reads time out after `slice` so a waiting reader never keeps the lock from a
/// writer for long; callers see the timeout as "no data yet".
pub struct TlsTransport {
    stream: Arc<Mutex<TlsStream>>,
    socket: TcpStream,
    slice: Duration,
}

impl TlsTransport {
    fn new(stream: TlsStream, socket: TcpStream, slice: Duration) -> io::Result<Self> {
        socket.set_nodelay(true)?;
        socket.set_read_timeout(Some(slice))?;
        Ok(Self {
            stream: Arc::new(Mutex::new(stream)),
            socket,
            slice,
        })
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, TlsStream>> {
        self.stream
            .lock()
            .map_err(|_| io::Error::other("tls stream lock poisoned"))
    }
}

impl Read for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock()?.read(buf)
    }
}

impl Write for TlsTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl Transport for TlsTransport {
    fn try_clone_box(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(Self {
            stream: Arc::clone(&self.stream),
            socket: self.socket.try_clone()?,
            slice: self.slice,
        }))
    }

    fn shutdown(&self) -> io::Result<()> {
        // Best effort: a reader may be holding the stream right now.
        if let Ok(mut s) = self.stream.try_lock() {
            s.send_close_notify();
            let _ = s.flush();
        }
        self.socket.shutdown(Shutdown::Both)
    }

    /// Reads already give up after one slice, which is all a polling caller needs.
    fn set_nonblocking(&self, _nonblocking: bool) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let t = timeout
            .map_or(self.slice, |t| t.min(self.slice))
            .max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(t))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

/// Terminates TLS on accepted sockets with a certificate loaded from PEM.
pub struct TlsServerUpgrader {
    config: Arc<ServerConfig>,
    read_slice: Duration,
}

impl TlsServerUpgrader {
    pub fn new(config: Arc<ServerConfig>, read_slice: Duration) -> Self {
        Self { config, read_slice }
    }

    /// # Errors
    ///
    /// Returns an `io::Error` if the certificate chain or key cannot be loaded or paired.
    pub fn from_settings(settings: &TlsSettings) -> io::Result<Self> {
        let certs = load_certs(&settings.cert)?;
        let key = load_private_key(&settings.key)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("TLS config error: {e}"))
            })?;
        Ok(Self::new(Arc::new(config), settings.read_slice))
    }
}

impl Upgrader for TlsServerUpgrader {
    fn upgrade(&self, stream: TcpStream) -> io::Result<Box<dyn Transport>> {
        let conn = ServerConnection::new(Arc::clone(&self.config)).map_err(io::Error::other)?;
        let socket = stream.try_clone()?;
        let tls = TlsStream::Server(StreamOwned::new(conn, stream));
        Ok(Box::new(TlsTransport::new(tls, socket, self.read_slice)?))
    }
}

/// Client side: trusts only the pinned CA and checks the server name.
pub struct TlsClientUpgrader {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    read_slice: Duration,
}

impl TlsClientUpgrader {
    pub fn new(
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
        read_slice: Duration,
    ) -> Self {
        Self {
            config,
            server_name,
            read_slice,
        }
    }

    /// # Errors
    ///
    /// Returns an `io::Error` if the CA cannot be loaded or the domain is not a valid name.
    pub fn from_settings(settings: &TlsSettings) -> io::Result<Self> {
        let roots = load_pinned_roots(&settings.ca)?;
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(settings.domain.clone()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid TLS domain {}: {e}", settings.domain),
            )
        })?;
        Ok(Self::new(Arc::new(config), server_name, settings.read_slice))
    }
}

impl Upgrader for TlsClientUpgrader {
    fn upgrade(&self, stream: TcpStream) -> io::Result<Box<dyn Transport>> {
        let conn = ClientConnection::new(Arc::clone(&self.config), self.server_name.clone())
            .map_err(io::Error::other)?;
        let socket = stream.try_clone()?;
        let tls = TlsStream::Client(StreamOwned::new(conn, stream));
        Ok(Box::new(TlsTransport::new(tls, socket, self.read_slice)?))
    }
}
