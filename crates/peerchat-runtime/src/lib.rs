//! PeerChat Runtime
//!
//! The chat engine that sits on top of a [`peerchat_core::Transport`]:
//!
//! - a single coordinator task owns the set of connected peers, dispatches the
//!   application callbacks and fans broadcast text out to every peer
//! - one session runner per connection drives an outbound and an inbound loop
//!   that share fate: whichever ends first takes the other down with it
//! - on shutdown the coordinator stops the transport and drains every pending
//!   peer exit before it releases its channels
//!
//! The application talks to the engine through [`Chat`] (setup and `run`) and
//! [`ChatHandle`] (sending and closing).

mod chat;
mod coordinator;
pub mod messages;
pub mod peers;
mod session;

pub use chat::{Chat, ChatHandle};
pub use messages::{InboundMessage, LifecycleSignal, PeerHandle, SessionEvent, SessionId};
pub use peers::{PeerSet, Transition};
pub use session::SessionRunner;
