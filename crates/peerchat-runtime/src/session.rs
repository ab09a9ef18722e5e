//! Peer Session Runner
//!
//! Runs the `chat` protocol over one transport session. Each session gets a fresh
//! outbound queue and two loops under a shared cancellation scope:
//!
//! - the outbound loop writes queued text to the peer
//! - the inbound loop reads messages and forwards decoded text to the coordinator
//!
//! The first loop to finish cancels the scope, so a failure on either side ends
//! the whole session. The runner reports `Joined` before the loops start and
//! `Left` after both have been joined.

use peerchat_core::{
    Msg, MsgReader, MsgWriter, PeerInfo, Protocol, Session, SessionHandler, TransportError,
    CHAT_PROTOCOL, TEXT_MSG,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::messages::{
    EventSender, InboundMessage, LifecycleSignal, PeerHandle, SessionEvent, SessionId,
};

// ----------------------------------------------------------------------------
// Session Runner
// ----------------------------------------------------------------------------

/// Session handler registered with the transport
pub struct SessionRunner {
    events: EventSender,
    outbound_buffer_size: usize,
}

impl SessionRunner {
    pub(crate) fn new(events: EventSender, outbound_buffer_size: usize) -> Self {
        Self {
            events,
            outbound_buffer_size,
        }
    }

    async fn report(&self, signal: LifecycleSignal) -> bool {
        self.events.send(SessionEvent::Lifecycle(signal)).await.is_ok()
    }
}

#[async_trait::async_trait]
impl SessionHandler for SessionRunner {
    fn protocol(&self) -> Protocol {
        CHAT_PROTOCOL
    }

    async fn run(&self, session: Session) -> peerchat_core::Result<()> {
        let Session {
            peer,
            reader,
            writer,
            shutdown,
        } = session;
        let session_id = SessionId::new();
        let (queue_tx, queue_rx) = mpsc::channel(self.outbound_buffer_size);

        info!(peer = %peer, session = %session_id, "Peer connected");

        let handle = PeerHandle::new(peer.clone(), session_id, queue_tx);
        if !self.report(LifecycleSignal::Joined(handle)).await {
            debug!(peer = %peer, "Coordinator gone, dropping session");
            return Ok(());
        }

        let scope = shutdown.child_token();
        let mut loops = JoinSet::new();
        loops.spawn(outbound_loop(writer, queue_rx, scope.clone(), peer.clone()));
        loops.spawn(inbound_loop(
            reader,
            self.events.clone(),
            scope.clone(),
            peer.clone(),
        ));

        let mut first_error = None;
        while let Some(joined) = loops.join_next().await {
            scope.cancel();

            let result = joined.unwrap_or_else(|e| {
                Err(TransportError::TaskFailed {
                    reason: e.to_string(),
                })
            });
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        let left = LifecycleSignal::Left {
            info: peer.clone(),
            session: session_id,
        };
        // The inbound loop has been joined, so every message it forwarded is
        // already queued ahead of this
        if !self.report(left).await {
            debug!(peer = %peer, "Coordinator gone before session exit was reported");
        }

        match first_error {
            Some(e) => {
                warn!(peer = %peer, error = %e, "Session terminated");
                Err(e)
            }
            None => {
                info!(peer = %peer, "Peer disconnected");
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Session Loops
// ----------------------------------------------------------------------------

async fn outbound_loop(
    mut writer: Box<dyn MsgWriter>,
    mut queue: mpsc::Receiver<String>,
    cancel: CancellationToken,
    peer: PeerInfo,
) -> peerchat_core::Result<()> {
    loop {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            text = queue.recv() => match text {
                Some(text) => text,
                None => {
                    debug!(peer = %peer, "Outbound queue closed");
                    return Ok(());
                }
            },
        };

        let msg = Msg::text(&text)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = writer.write_msg(msg) => {
                if let Err(e) = result {
                    warn!(peer = %peer, error = %e, "Failed to write message");
                    return Err(e);
                }
            }
        }
    }
}

async fn inbound_loop(
    mut reader: Box<dyn MsgReader>,
    events: EventSender,
    cancel: CancellationToken,
    peer: PeerInfo,
) -> peerchat_core::Result<()> {
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = reader.read_msg() => result,
        };

        let msg = match result {
            Ok(msg) => msg,
            Err(e) if e.is_eof() => {
                debug!(peer = %peer, "Peer closed the connection");
                return Ok(());
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to read message");
                return Err(e);
            }
        };

        if msg.code != TEXT_MSG {
            warn!(peer = %peer, code = msg.code, "Ignoring message with unexpected code");
            continue;
        }
        let text: String = match msg.decode() {
            Ok(text) => text,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Discarding malformed message");
                continue;
            }
        };

        let message = InboundMessage {
            peer: peer.clone(),
            text,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = events.send(SessionEvent::Inbound(message)) => {
                if result.is_err() {
                    debug!(peer = %peer, "Coordinator gone, stopping inbound loop");
                    return Ok(());
                }
            }
        }
    }
}
