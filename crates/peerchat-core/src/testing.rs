//! In-memory transport for tests
//!
//! [`MemoryTransport`] implements [`Transport`] without any networking. The paired
//! [`MemoryNetwork`] plays the remote side: it opens sessions on demand and hands
//! back a [`RemotePeer`] that can send text, inject malformed or failing reads,
//! break the write path, hang up, and observe the session's terminal result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::errors::TransportError;
use crate::protocol::{Msg, TEXT_MSG};
use crate::transport::{MsgReader, MsgWriter, Session, SessionHandler, Transport};
use crate::types::{PeerAddr, PeerInfo};
use crate::Result;

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

struct Shared {
    handler: watch::Sender<Option<Arc<dyn SessionHandler>>>,
    dialed: Mutex<Vec<PeerAddr>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    fail_start: bool,
}

// ----------------------------------------------------------------------------
// Memory Transport
// ----------------------------------------------------------------------------

pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryNetwork) {
        Self::build(false)
    }

    /// A transport whose `start` always fails
    pub fn failing() -> (Self, MemoryNetwork) {
        Self::build(true)
    }

    fn build(fail_start: bool) -> (Self, MemoryNetwork) {
        let (handler, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            handler,
            dialed: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            fail_start,
        });

        (
            Self {
                shared: shared.clone(),
            },
            MemoryNetwork { shared },
        )
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn start(&mut self, handler: Arc<dyn SessionHandler>) -> Result<()> {
        if self.shared.fail_start {
            return Err(TransportError::Bind {
                addr: "memory".to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        self.shared.handler.send_replace(Some(handler));
        Ok(())
    }

    fn add_peer(&mut self, addr: PeerAddr) {
        self.shared
            .dialed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(addr);
    }

    async fn stop(&mut self) {
        self.shared.shutdown.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
    }
}

// ----------------------------------------------------------------------------
// Memory Network (remote side)
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct MemoryNetwork {
    shared: Arc<Shared>,
}

impl MemoryNetwork {
    /// Addresses passed to `add_peer`, in order
    pub fn dialed(&self) -> Vec<PeerAddr> {
        self.shared
            .dialed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Wait until the transport has been started and return its handler
    pub async fn wait_started(&self) -> Arc<dyn SessionHandler> {
        let mut rx = self.shared.handler.subscribe();
        loop {
            if let Some(handler) = rx.borrow_and_update().clone() {
                return handler;
            }
            // The sender lives in `shared`, so the channel stays open
            let _ = rx.changed().await;
        }
    }

    /// Open a session from a remote peer, as if it had just connected
    pub async fn connect(&self, peer: PeerInfo) -> RemotePeer {
        let handler = self.wait_started().await;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let broken = Arc::new(AtomicBool::new(false));
        let (stall, stalled) = watch::channel(false);

        let session = Session {
            peer: peer.clone(),
            reader: Box::new(MemoryReader { rx: inbound_rx }),
            writer: Box::new(MemoryWriter {
                tx: outbound_tx,
                broken: broken.clone(),
                stalled,
            }),
            shutdown: self.shared.shutdown.child_token(),
        };

        self.shared.tracker.spawn(async move {
            let result = handler.run(session).await;
            let _ = outcome_tx.send(result);
        });

        RemotePeer {
            info: peer,
            tx: Some(inbound_tx),
            rx: outbound_rx,
            broken,
            stall,
            outcome: Some(outcome_rx),
        }
    }
}

// ----------------------------------------------------------------------------
// Session Streams
// ----------------------------------------------------------------------------

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Result<Msg>>,
}

#[async_trait::async_trait]
impl MsgReader for MemoryReader {
    async fn read_msg(&mut self) -> Result<Msg> {
        self.rx.recv().await.unwrap_or(Err(TransportError::Eof))
    }
}

struct MemoryWriter {
    tx: mpsc::UnboundedSender<Msg>,
    broken: Arc<AtomicBool>,
    stalled: watch::Receiver<bool>,
}

#[async_trait::async_trait]
impl MsgWriter for MemoryWriter {
    async fn write_msg(&mut self, msg: Msg) -> Result<()> {
        if self.stalled.wait_for(|stalled| !*stalled).await.is_err() {
            return Err(broken_pipe());
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(broken_pipe());
        }
        self.tx.send(msg).map_err(|_| broken_pipe())
    }
}

fn broken_pipe() -> TransportError {
    TransportError::NetworkIo(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "memory connection broken",
    ))
}

// ----------------------------------------------------------------------------
// Remote Peer
// ----------------------------------------------------------------------------

/// Remote end of one in-memory session
pub struct RemotePeer {
    pub info: PeerInfo,
    tx: Option<mpsc::UnboundedSender<Result<Msg>>>,
    rx: mpsc::UnboundedReceiver<Msg>,
    broken: Arc<AtomicBool>,
    stall: watch::Sender<bool>,
    outcome: Option<oneshot::Receiver<Result<()>>>,
}

impl RemotePeer {
    /// Send a text message to the local node
    pub fn send_text(&self, text: &str) -> bool {
        match Msg::text(text) {
            Ok(msg) => self.send_msg(msg),
            Err(_) => false,
        }
    }

    /// Send a text-coded message with an arbitrary payload
    pub fn send_raw(&self, payload: Vec<u8>) -> bool {
        self.send_msg(Msg::new(TEXT_MSG, payload))
    }

    pub fn send_msg(&self, msg: Msg) -> bool {
        self.inject(Ok(msg))
    }

    /// Make the local node's next read fail with `error`
    pub fn fail_read(&self, error: TransportError) -> bool {
        self.inject(Err(error))
    }

    /// Make every subsequent write from the local node fail
    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Block the local node's writes until [`RemotePeer::resume_writes`]
    pub fn stall_writes(&self) {
        self.stall.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.stall.send_replace(false);
    }

    /// Hang up: the local node reads EOF once queued messages are consumed
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Next text written by the local node, or `None` once the session is gone
    pub async fn recv_text(&mut self) -> Option<String> {
        let msg = self.rx.recv().await?;
        msg.decode().ok()
    }

    /// A text already written by the local node, without waiting
    pub fn try_recv_text(&mut self) -> Option<String> {
        let msg = self.rx.try_recv().ok()?;
        msg.decode().ok()
    }

    /// Wait for the session handler to return
    pub async fn outcome(&mut self) -> Option<Result<()>> {
        let rx = self.outcome.take()?;
        rx.await.ok()
    }

    fn inject(&self, item: Result<Msg>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}
