//! Session Coordinator
//!
//! The single task that owns the [`PeerSet`]. It multiplexes session events and
//! broadcast requests, and on cancellation runs the drain: the transport is
//! stopped while remaining lifecycle signals are still applied, and the event
//! channel is closed only once every session has reported its exit.

use std::sync::Arc;

use peerchat_core::{ChatError, PeerAddr, PeerInfo, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::messages::{
    BroadcastReceiver, EventReceiver, InboundMessage, LifecycleSignal, SessionEvent,
};
use crate::peers::{PeerSet, Transition};
use crate::session::SessionRunner;

pub(crate) type MessageCallback = Box<dyn FnMut(&PeerInfo, &str) + Send>;
pub(crate) type PeerCallback = Box<dyn FnMut(&PeerInfo) + Send>;

// ----------------------------------------------------------------------------
// Coordinator State
// ----------------------------------------------------------------------------

/// Peer set and application callbacks, touched only by the coordinator task
#[derive(Default)]
pub(crate) struct CoordinatorState {
    pub(crate) peers: PeerSet,
    pub(crate) on_msg: Option<MessageCallback>,
    pub(crate) on_peer_in: Option<PeerCallback>,
    pub(crate) on_peer_out: Option<PeerCallback>,
}

impl CoordinatorState {
    fn handle_lifecycle(&mut self, signal: LifecycleSignal) {
        match self.peers.apply(signal) {
            Transition::Admitted(info) => {
                info!(peer = %info, peers = self.peers.len(), "Peer joined");
                if let Some(callback) = self.on_peer_in.as_mut() {
                    callback(&info);
                }
            }
            Transition::Evicted(info) => {
                info!(peer = %info, peers = self.peers.len(), "Peer left");
                if let Some(callback) = self.on_peer_out.as_mut() {
                    callback(&info);
                }
            }
            Transition::DuplicateJoin(info) => {
                warn!(peer = %info, "Duplicate session for registered peer, dropping it");
            }
            Transition::StaleLeave(info) => {
                debug!(peer = %info, "Ignoring exit of unregistered session");
            }
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Lifecycle(signal) => self.handle_lifecycle(signal),
            SessionEvent::Inbound(message) => self.handle_inbound(message),
        }
    }

    fn handle_inbound(&mut self, message: InboundMessage) {
        if let Some(callback) = self.on_msg.as_mut() {
            callback(&message.peer, &message.text);
        }
    }
}

// ----------------------------------------------------------------------------
// Coordinator
// ----------------------------------------------------------------------------

pub(crate) struct Coordinator<T: Transport> {
    transport: T,
    static_peers: Vec<String>,
    runner: Option<Arc<SessionRunner>>,
    pub(crate) state: CoordinatorState,
    events_rx: EventReceiver,
    broadcast_rx: Option<BroadcastReceiver>,
}

impl<T: Transport> Coordinator<T> {
    pub(crate) fn new(
        transport: T,
        static_peers: Vec<String>,
        runner: SessionRunner,
        events_rx: EventReceiver,
        broadcast_rx: BroadcastReceiver,
    ) -> Self {
        Self {
            transport,
            static_peers,
            runner: Some(Arc::new(runner)),
            state: CoordinatorState::default(),
            events_rx,
            broadcast_rx: Some(broadcast_rx),
        }
    }

    /// Start the transport, run until `cancel` fires, then drain
    pub(crate) async fn run(mut self, cancel: CancellationToken) -> Result<(), ChatError> {
        self.start().await?;
        self.event_loop(&cancel).await;
        self.drain().await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------------

    async fn start(&mut self) -> Result<(), ChatError> {
        let runner = self.runner.take().ok_or_else(|| ChatError::InvalidConfiguration {
            reason: "coordinator already started".to_string(),
        })?;
        self.transport
            .start(runner)
            .await
            .map_err(ChatError::TransportStart)?;
        info!("Transport started");

        for raw in &self.static_peers {
            match raw.parse::<PeerAddr>() {
                Ok(addr) => {
                    debug!(peer = %addr, "Adding static peer");
                    self.transport.add_peer(addr);
                }
                Err(e) => warn!(peer = %raw, error = %e, "Skipping invalid peer address"),
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Event Loop
    // ------------------------------------------------------------------------

    async fn event_loop(&mut self, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                Some(event) = self.events_rx.recv() => {
                    self.state.handle_event(event);
                }

                text = recv_broadcast(&mut self.broadcast_rx) => match text {
                    Some(text) => self.broadcast(text, cancel).await,
                    None => {
                        debug!("Broadcast channel closed by application");
                        self.broadcast_rx = None;
                    }
                },
            }
        }
    }

    /// Queue `text` on every registered peer
    ///
    /// Each delivery races `cancel`; peers not reached before cancellation are
    /// skipped.
    async fn broadcast(&mut self, text: String, cancel: &CancellationToken) {
        let total = self.state.peers.len();
        let mut delivered = 0usize;

        for handle in self.state.peers.handles() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(delivered, total, "Broadcast interrupted by shutdown");
                    return;
                }
                result = handle.deliver(text.clone()) => match result {
                    Ok(()) => delivered += 1,
                    Err(_) => debug!(peer = %handle.info, "Session already gone, skipping"),
                },
            }
        }

        debug!(delivered, total, "Broadcast queued");
    }

    // ------------------------------------------------------------------------
    // Shutdown / Drain
    // ------------------------------------------------------------------------

    async fn drain(&mut self) {
        // No new application text once the loop is done
        self.broadcast_rx = None;
        info!(peers = self.state.peers.len(), "Stopping transport");

        let stop = self.transport.stop();
        tokio::pin!(stop);
        let mut stopped = false;

        loop {
            if stopped && self.state.peers.is_empty() {
                break;
            }

            tokio::select! {
                _ = &mut stop, if !stopped => {
                    debug!(remaining = self.state.peers.len(), "Transport stopped");
                    stopped = true;
                }

                Some(event) = self.events_rx.recv() => match event {
                    SessionEvent::Lifecycle(signal) => self.state.handle_lifecycle(signal),
                    SessionEvent::Inbound(message) => {
                        debug!(peer = %message.peer, "Discarding message received during shutdown");
                    }
                },

                else => {
                    warn!(
                        remaining = self.state.peers.len(),
                        "Event channel closed before all sessions exited"
                    );
                    break;
                }
            }
        }

        self.events_rx.close();
        info!("Chat stopped");
    }
}

async fn recv_broadcast(rx: &mut Option<BroadcastReceiver>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
