//! TCP transport
//!
//! One accept loop plus one dial loop per static peer, all tracked so `stop` can
//! wait for every connection task, and with it every session handler, to finish.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use peerchat_core::{
    PeerAddr, PeerId, PeerInfo, Session, SessionHandler, Transport, TransportError,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::TcpTransportConfig;
use crate::framing::{codec, FrameReader, FrameWriter};
use crate::handshake::{self, Local};

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

pub struct TcpTransport {
    config: Arc<TcpTransportConfig>,
    pending: Vec<PeerAddr>,
    running: Option<Arc<Inner>>,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config: Arc::new(config),
            pending: Vec::new(),
            running: None,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.config.identity.peer_id()
    }

    /// Bound address once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|inner| inner.local_addr)
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn start(&mut self, handler: Arc<dyn SessionHandler>) -> peerchat_core::Result<()> {
        if self.running.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        self.config.validate()?;

        let listener = TcpListener::bind(self.config.listen_addr.as_str())
            .await
            .map_err(|e| TransportError::Bind {
                addr: self.config.listen_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, id = %self.peer_id(), "Listening for peers");

        let inner = Arc::new(Inner {
            config: self.config.clone(),
            handler,
            active: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            local_addr,
        });

        inner.tracker.spawn(inner.clone().accept_loop(listener));
        for addr in self.pending.drain(..) {
            inner.tracker.spawn(inner.clone().dial_loop(addr));
        }

        self.running = Some(inner);
        Ok(())
    }

    fn add_peer(&mut self, addr: PeerAddr) {
        match &self.running {
            Some(inner) => {
                inner.tracker.spawn(inner.clone().dial_loop(addr));
            }
            None => self.pending.push(addr),
        }
    }

    async fn stop(&mut self) {
        let Some(inner) = self.running.take() else {
            return;
        };

        inner.shutdown.cancel();
        inner.tracker.close();
        inner.tracker.wait().await;
        info!("Transport stopped");
    }
}

// ----------------------------------------------------------------------------
// Running State
// ----------------------------------------------------------------------------

struct Inner {
    config: Arc<TcpTransportConfig>,
    handler: Arc<dyn SessionHandler>,
    /// Peers with a running session
    active: Mutex<HashSet<PeerId>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    local_addr: SocketAddr,
}

/// Removes the peer from the active set when its session ends
struct ActiveGuard<'a> {
    inner: &'a Inner,
    peer: PeerId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.inner.active_set().remove(&self.peer);
    }
}

impl Inner {
    fn active_set(&self) -> std::sync::MutexGuard<'_, HashSet<PeerId>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_active(&self, peer: &PeerId) -> bool {
        self.active_set().contains(peer)
    }

    fn register(&self, peer: &PeerInfo) -> Result<ActiveGuard<'_>, TransportError> {
        let mut active = self.active_set();
        if active.contains(&peer.id) {
            return Err(TransportError::handshake(peer, "already connected"));
        }
        if active.len() >= self.config.max_peers {
            return Err(TransportError::handshake(
                peer,
                format!("peer limit of {} reached", self.config.max_peers),
            ));
        }
        active.insert(peer.id);

        Ok(ActiveGuard {
            inner: self,
            peer: peer.id,
        })
    }

    // ------------------------------------------------------------------------
    // Accepting
    // ------------------------------------------------------------------------

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        debug!(remote = %remote, "Accepted connection");
                        self.tracker.spawn(self.clone().serve(stream, remote, None));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
            }
        }
        debug!("Accept loop stopped");
    }

    // ------------------------------------------------------------------------
    // Dialing
    // ------------------------------------------------------------------------

    async fn dial_loop(self: Arc<Self>, addr: PeerAddr) {
        let our_id = self.config.identity.peer_id();
        // The side with the larger id backs off so simultaneous dials rarely collide
        let backoff = if our_id > addr.id {
            self.config.redial_interval / 2
        } else {
            std::time::Duration::ZERO
        };

        loop {
            if !backoff.is_zero() && !self.pause(backoff).await {
                break;
            }

            if !self.is_active(&addr.id) {
                if let Err(e) = self.dial(&addr).await {
                    debug!(peer = %addr, error = %e, "Dial failed");
                }
            }

            if !self.pause(self.config.redial_interval).await {
                break;
            }
        }
        debug!(peer = %addr, "Dial loop stopped");
    }

    async fn dial(self: &Arc<Self>, addr: &PeerAddr) -> peerchat_core::Result<()> {
        let connect = timeout(self.config.connect_timeout, TcpStream::connect(addr.dial_target()));
        let stream = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(TransportError::Shutdown),
            connected = connect => connected.map_err(|_| TransportError::Timeout {
                duration_ms: self.config.connect_timeout.as_millis() as u64,
            })??,
        };
        let remote = stream.peer_addr()?;
        debug!(peer = %addr, remote = %remote, "Connected");

        self.clone().serve(stream, remote, Some(addr.id)).await;
        Ok(())
    }

    /// Sleep for `duration`; false if the transport stopped meanwhile
    async fn pause(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Authenticate the connection and run the session handler over it
    async fn serve(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        expected: Option<PeerId>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(remote = %remote, error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, codec(self.config.max_frame_len));
        let mut writer = FramedWrite::new(write_half, codec(self.config.max_frame_len));

        let protocol = self.handler.protocol();
        let local = Local {
            identity: &self.config.identity,
            name: &self.config.name,
            protocol,
        };
        let handshake = timeout(
            self.config.handshake_timeout,
            handshake::perform(&local, &mut reader, &mut writer, expected, remote),
        );

        let peer = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            result = handshake => match result {
                Ok(Ok(peer)) => peer,
                Ok(Err(e)) => {
                    warn!(remote = %remote, error = %e, "Handshake failed");
                    return;
                }
                Err(_) => {
                    warn!(remote = %remote, "Handshake timed out");
                    return;
                }
            },
        };

        let _guard = match self.register(&peer) {
            Ok(guard) => guard,
            Err(e) => {
                info!(peer = %peer, error = %e, "Rejecting session");
                return;
            }
        };

        let session = Session {
            peer: peer.clone(),
            reader: Box::new(FrameReader::new(reader, protocol)),
            writer: Box::new(FrameWriter::new(writer)),
            shutdown: self.shutdown.child_token(),
        };

        match self.handler.run(session).await {
            Ok(()) => debug!(peer = %peer, "Session finished"),
            Err(e) => debug!(peer = %peer, error = %e, "Session finished with error"),
        }
    }
}
