//! Messages exchanged between session runners and the coordinator

use std::fmt;

use peerchat_core::{PeerId, PeerInfo};
use tokio::sync::mpsc;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Session Identifier
// ----------------------------------------------------------------------------

/// Identifies one session of a peer; a reconnecting peer gets a new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

// ----------------------------------------------------------------------------
// Peer Handle
// ----------------------------------------------------------------------------

/// The coordinator's view of a live session: who it is and where to queue text
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub info: PeerInfo,
    pub session: SessionId,
    outbound: mpsc::Sender<String>,
}

impl PeerHandle {
    pub fn new(info: PeerInfo, session: SessionId, outbound: mpsc::Sender<String>) -> Self {
        Self {
            info,
            session,
            outbound,
        }
    }

    pub fn id(&self) -> PeerId {
        self.info.id
    }

    /// Queue text for the session's outbound loop
    ///
    /// Waits while the queue is full. Fails once the session has stopped reading
    /// its queue.
    pub async fn deliver(&self, text: String) -> Result<(), mpsc::error::SendError<String>> {
        self.outbound.send(text).await
    }
}

// ----------------------------------------------------------------------------
// Coordinator Inputs
// ----------------------------------------------------------------------------

/// Membership change reported by a session runner
#[derive(Debug)]
pub enum LifecycleSignal {
    Joined(PeerHandle),
    Left { info: PeerInfo, session: SessionId },
}

/// Text received from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub peer: PeerInfo,
    pub text: String,
}

/// Everything a session runner reports, in the order the session produced it
///
/// Lifecycle signals and received text share one channel so the coordinator
/// sees `Joined`, then the session's messages, then `Left`.
#[derive(Debug)]
pub enum SessionEvent {
    Lifecycle(LifecycleSignal),
    Inbound(InboundMessage),
}

pub(crate) type EventSender = mpsc::Sender<SessionEvent>;
pub(crate) type EventReceiver = mpsc::Receiver<SessionEvent>;
pub(crate) type BroadcastSender = mpsc::Sender<String>;
pub(crate) type BroadcastReceiver = mpsc::Receiver<String>;
