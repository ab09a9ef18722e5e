//! PeerChat Core
//!
//! Shared building blocks for the PeerChat broadcast chat: peer identity types,
//! the `chat` wire protocol, the transport seam that hands established sessions to
//! the runtime, channel sizing, and the node's Ed25519 identity.
//!
//! ## Architecture
//!
//! The core holds no tasks of its own. A [`Transport`] implementation owns the
//! network, and for every authenticated connection it calls the registered
//! [`SessionHandler`] with a [`Session`]. The runtime crate implements the handler
//! and the coordinator on top of these traits.

pub mod config;
pub mod errors;
pub mod identity;
pub mod protocol;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API Exports
// ----------------------------------------------------------------------------

pub use config::ChannelConfig;
pub use errors::{ChatError, IdentityError, PeerAddrError, TransportError};
pub use identity::IdentityKeyPair;
pub use protocol::{Msg, Protocol, CHAT_PROTOCOL, TEXT_MSG};
pub use transport::{MsgReader, MsgWriter, Session, SessionHandler, Transport};
pub use types::{PeerAddr, PeerId, PeerInfo};

/// Result type for transport and session operations
pub type Result<T> = std::result::Result<T, TransportError>;
