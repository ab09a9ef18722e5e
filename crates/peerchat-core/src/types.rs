//! Core types for PeerChat
//!
//! Peer identifiers, per-session peer metadata and the static peer address format.

use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PeerAddrError;

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Unique identifier for a peer: its Ed25519 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Create a new PeerId from 32 bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Abbreviated hex form used in log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PeerId {
    type Err = PeerAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);

        let bytes = hex::decode(clean_str).map_err(|e| PeerAddrError::InvalidKey {
            reason: e.to_string(),
        })?;

        let id: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PeerAddrError::InvalidKey {
                reason: format!("expected 32 bytes, got {}", bytes.len()),
            })?;

        Ok(Self(id))
    }
}

impl Deref for PeerId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Peer Info
// ----------------------------------------------------------------------------

/// Identity and display metadata of a connected peer, fixed for the session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    pub id: PeerId,
    pub name: String,
    pub remote_addr: Option<SocketAddr>,
}

impl PeerInfo {
    pub fn new(id: PeerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            remote_addr: None,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.id.short())
    }
}

// ----------------------------------------------------------------------------
// Peer Address
// ----------------------------------------------------------------------------

const PEER_ADDR_SCHEME: &str = "peer://";

/// Statically configured peer: `[peer://]<hex public key>@<host>:<port>`
///
/// The host is kept unresolved; resolution happens when the transport dials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub id: PeerId,
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    /// `host:port` suitable for `TcpStream::connect`
    pub fn dial_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}@{}:{}", PEER_ADDR_SCHEME, self.id, self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = PeerAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let rest = input.strip_prefix(PEER_ADDR_SCHEME).unwrap_or(input);

        let (key, endpoint) = rest
            .split_once('@')
            .ok_or_else(|| PeerAddrError::InvalidFormat {
                input: input.to_string(),
            })?;
        let id: PeerId = key.parse()?;

        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| PeerAddrError::InvalidFormat {
                input: input.to_string(),
            })?;
        if host.is_empty() {
            return Err(PeerAddrError::MissingHost {
                input: input.to_string(),
            });
        }
        let port: u16 = port.parse().map_err(|_| PeerAddrError::InvalidPort {
            port: port.to_string(),
        })?;

        Ok(Self {
            id,
            host: host.to_string(),
            port,
        })
    }
}
