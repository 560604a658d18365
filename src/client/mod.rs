//! Streaming client: handshake, then a blocking receive loop that hands frames
//! to callbacks, plus a heartbeat loop keeping the session alive.

mod callbacks;
mod client_error;
mod client_state;
mod heartbeat_loop;
mod receive_loop;
mod shared;
mod stats;
mod stream_client;

pub use callbacks::{AudioCallback, DisconnectCallback, VideoCallback};
pub use client_error::ClientError;
pub use client_state::ClientState;
pub use stats::{ClientStats, StatsSnapshot};
pub use stream_client::StreamClient;
