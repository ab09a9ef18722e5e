//! The set of connected peers
//!
//! Owned and mutated by the coordinator task only. A peer is present exactly
//! while its session is registered and has not reported exit.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use peerchat_core::{PeerId, PeerInfo};

use crate::messages::{LifecycleSignal, PeerHandle};

/// Outcome of applying a [`LifecycleSignal`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The peer was absent and is now registered
    Admitted(PeerInfo),
    /// The peer's current session ended and it was removed
    Evicted(PeerInfo),
    /// A second session for an already registered peer; its handle was dropped
    DuplicateJoin(PeerInfo),
    /// Exit of a session that is not the registered one
    StaleLeave(PeerInfo),
}

#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashMap<PeerId, PeerHandle>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, signal: LifecycleSignal) -> Transition {
        match signal {
            LifecycleSignal::Joined(handle) => match self.peers.entry(handle.id()) {
                Entry::Occupied(_) => Transition::DuplicateJoin(handle.info),
                Entry::Vacant(slot) => {
                    let info = handle.info.clone();
                    slot.insert(handle);
                    Transition::Admitted(info)
                }
            },
            LifecycleSignal::Left { info, session } => {
                let current = self
                    .peers
                    .get(&info.id)
                    .map(|handle| handle.session == session)
                    .unwrap_or(false);

                if current {
                    self.peers.remove(&info.id);
                    Transition::Evicted(info)
                } else {
                    Transition::StaleLeave(info)
                }
            }
        }
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerHandle> {
        self.peers.get(id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &PeerHandle> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
