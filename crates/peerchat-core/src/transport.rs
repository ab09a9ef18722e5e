//! Transport Seam
//!
//! Defines the interface between a network transport and the chat runtime.
//! Concrete transports live in their own crates (`peerchat-tcp`); an in-memory
//! transport for tests lives in [`crate::testing`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::protocol::{Msg, Protocol};
use crate::types::{PeerAddr, PeerInfo};
use crate::Result;

// ----------------------------------------------------------------------------
// Message Streams
// ----------------------------------------------------------------------------

/// Reading half of an established session
#[async_trait::async_trait]
pub trait MsgReader: Send {
    /// Read the next message
    ///
    /// Returns [`crate::TransportError::Eof`] once the remote side has closed the
    /// connection. Codes outside the negotiated protocol are read errors.
    async fn read_msg(&mut self) -> Result<Msg>;
}

/// Writing half of an established session
#[async_trait::async_trait]
pub trait MsgWriter: Send {
    async fn write_msg(&mut self, msg: Msg) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// An authenticated connection handed to the session handler
pub struct Session {
    pub peer: PeerInfo,
    pub reader: Box<dyn MsgReader>,
    pub writer: Box<dyn MsgWriter>,
    /// Cancelled by the transport when it stops
    pub shutdown: CancellationToken,
}

/// Runs the protocol over one session
///
/// The transport calls [`SessionHandler::run`] once per session and treats the
/// session as finished when the future completes. The returned error, if any, is
/// only logged by the transport.
#[async_trait::async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    fn protocol(&self) -> Protocol;

    async fn run(&self, session: Session) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// A peer-to-peer transport
///
/// ## Lifecycle
///
/// - `start` binds and begins accepting sessions, dispatching each to `handler`
/// - `add_peer` asks the transport to connect to a static peer
/// - `stop` cancels every session and returns once all session handlers finished
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    async fn start(&mut self, handler: Arc<dyn SessionHandler>) -> Result<()>;

    fn add_peer(&mut self, addr: PeerAddr);

    async fn stop(&mut self);
}
