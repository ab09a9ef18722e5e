//! Application facade over the coordinator

use peerchat_core::{ChannelConfig, ChatError, PeerInfo, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::messages::BroadcastSender;
use crate::session::SessionRunner;

// ----------------------------------------------------------------------------
// Chat
// ----------------------------------------------------------------------------

/// A chat node bound to a transport, ready to run
///
/// Callbacks are invoked on the coordinator task, one at a time, and must not
/// block for long: the coordinator does nothing else while they run.
pub struct Chat<T: Transport> {
    coordinator: Coordinator<T>,
}

/// Sending side of a chat, handed to the application
///
/// Not `Clone`: [`ChatHandle::close`] consumes it, so the broadcast channel is
/// released exactly once.
#[derive(Debug)]
pub struct ChatHandle {
    broadcast: BroadcastSender,
}

impl<T: Transport> Chat<T> {
    /// Create a chat over `transport` that will dial the given static peers
    ///
    /// Peer addresses are parsed when the chat starts; invalid ones are logged
    /// and skipped.
    pub fn new(
        transport: T,
        peers: Vec<String>,
        config: ChannelConfig,
    ) -> Result<(Self, ChatHandle), ChatError> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_size);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_buffer_size);

        let runner = SessionRunner::new(events_tx, config.outbound_buffer_size);
        let coordinator = Coordinator::new(transport, peers, runner, events_rx, broadcast_rx);

        Ok((
            Self { coordinator },
            ChatHandle {
                broadcast: broadcast_tx,
            },
        ))
    }

    /// Called with every text received from a peer
    pub fn on_msg<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&PeerInfo, &str) + Send + 'static,
    {
        self.coordinator.state.on_msg = Some(Box::new(callback));
        self
    }

    /// Called when a peer's session is registered
    pub fn on_peer_in<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&PeerInfo) + Send + 'static,
    {
        self.coordinator.state.on_peer_in = Some(Box::new(callback));
        self
    }

    /// Called when a registered peer's session has ended
    pub fn on_peer_out<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&PeerInfo) + Send + 'static,
    {
        self.coordinator.state.on_peer_out = Some(Box::new(callback));
        self
    }

    /// Run until `cancel` fires
    ///
    /// Returns once the transport has stopped and every session has reported its
    /// exit. Fails only if the transport cannot be started.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ChatError> {
        self.coordinator.run(cancel).await
    }
}

// ----------------------------------------------------------------------------
// Chat Handle
// ----------------------------------------------------------------------------

impl ChatHandle {
    /// Hand `text` to the coordinator for broadcast to all connected peers
    ///
    /// Waits until the request fits in the broadcast buffer or `cancel` fires.
    /// With the default buffer of one that means the coordinator has taken the
    /// previous request. Text still buffered when the chat shuts down is
    /// dropped. Fails with [`ChatError::Closed`] once the chat has stopped.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        text: impl Into<String>,
    ) -> Result<(), ChatError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = self.broadcast.send(text.into()) => result.map_err(|_| ChatError::Closed),
        }
    }

    /// Release the broadcast channel; the chat keeps running
    pub fn close(self) {
        debug!("Closing broadcast channel");
    }
}
