use std::time::Duration;

use peerchat_core::{IdentityKeyPair, TransportError};

/// Default listen address, all interfaces
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9876";

/// Configuration for a [`TcpTransport`](crate::TcpTransport).
///
/// Only the identity and display name are required. Everything else has a
/// default and a builder method:
///
/// ```rust
/// use peerchat_core::IdentityKeyPair;
/// use peerchat_tcp::TcpTransportConfig;
///
/// let config = TcpTransportConfig::new(IdentityKeyPair::generate(), "alice")
///     .listen_addr(":9000")
///     .max_peers(4);
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub(crate) identity: IdentityKeyPair,
    pub(crate) name: String,
    pub(crate) listen_addr: String,
    /// Upper bound on concurrent sessions, inbound and outbound together.
    pub(crate) max_peers: usize,
    /// Pause between attempts to reach a static peer that is not connected.
    pub(crate) redial_interval: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) handshake_timeout: Duration,
    pub(crate) max_frame_len: usize,
}

impl TcpTransportConfig {
    pub fn new(identity: IdentityKeyPair, name: impl Into<String>) -> Self {
        Self {
            identity,
            name: name.into(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_peers: 16,
            redial_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            max_frame_len: 1024 * 1024, // 1 MB
        }
    }

    /// Set the listen address; `":port"` binds all interfaces.
    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.listen_addr = normalize_listen_addr(addr);
        self
    }

    pub fn max_peers(mut self, max: usize) -> Self {
        self.max_peers = max;
        self
    }

    pub fn redial_interval(mut self, interval: Duration) -> Self {
        self.redial_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Largest accepted frame in bytes (default: 1 MB).
    pub fn max_frame_len(mut self, bytes: usize) -> Self {
        self.max_frame_len = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        let invalid = |reason: &str| {
            Err(TransportError::InvalidConfiguration {
                reason: reason.to_string(),
            })
        };

        if self.max_peers == 0 {
            return invalid("max_peers must be greater than zero");
        }
        if self.max_frame_len == 0 {
            return invalid("max_frame_len must be greater than zero");
        }
        if self.redial_interval.is_zero() {
            return invalid("redial_interval must be non-zero");
        }
        if self.listen_addr.is_empty() {
            return invalid("listen_addr must not be empty");
        }
        Ok(())
    }
}

/// Expand a bare `":port"` into `"0.0.0.0:port"`
pub fn normalize_listen_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}
