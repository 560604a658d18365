//! Broadcast server: accepts consumers, tracks their sessions and fans frames out.
//!
//! Threads: one accept loop, one heartbeat monitor, and per session a reader
//! (handshake + dispatch) and a writer draining that session's bounded queue.
//! The registry lock is held only to look sessions up and enqueue, never
//! across a socket write, so a stalled consumer cannot hold up the others.

mod accept_loop;
mod broadcast_server;
mod client_session;
mod heartbeat_monitor;
mod outbound;
mod registry;
mod server_error;
mod server_state;
mod session_loop;

pub use broadcast_server::BroadcastServer;
pub use client_session::{SessionId, SessionInfo};
pub use server_error::ServerError;
pub use server_state::ServerState;
