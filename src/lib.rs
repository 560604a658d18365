//! streamcast streams video and audio frames from one producer to many consumers
//! over a small binary TCP protocol.
//!
//! It provides two binaries:
//! - `stream_server`: broadcasts frames to every connected client.
//! - `stream_client`: connects, receives frames and reports what it got.
//!
//! The crate is structured into several modules, each responsible for one
//! layer of the protocol or of the surrounding application.

/// Streaming client: receive and heartbeat loops, frame callbacks.
pub mod client;
/// Wall-clock helpers.
pub mod clock;
/// Handles configuration loading and typed settings.
pub mod config;
/// The opening HANDSHAKE exchange, for both peers.
pub mod handshake;
/// Logging utilities for the application.
pub mod log;
/// Packet header, payload layouts, media frames and stream framing.
pub mod protocol;
/// Broadcast server: accept loop, session registry, heartbeat supervision.
pub mod server;
/// Byte-stream abstraction with plain TCP and optional TLS.
pub mod transport;
