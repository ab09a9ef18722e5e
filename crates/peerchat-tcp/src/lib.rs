//! PeerChat TCP Transport
//!
//! A [`peerchat_core::Transport`] over plain TCP:
//!
//! - every connection starts with a signed-nonce handshake that proves both
//!   sides hold the key behind their [`peerchat_core::PeerId`] and agree on the
//!   protocol name and version
//! - messages are bincode-encoded and carried in length-delimited frames
//! - static peers are re-dialed at a fixed interval while not connected
//! - at most one session per peer, and at most `max_peers` sessions in total

mod config;
mod framing;
mod handshake;
mod transport;

pub use config::{normalize_listen_addr, TcpTransportConfig};
pub use transport::TcpTransport;
