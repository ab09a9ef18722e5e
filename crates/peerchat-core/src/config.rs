//! Channel sizing for the chat runtime

use crate::errors::ChatError;

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes of the bounded channels between the coordinator, the session
/// runners and the application
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Session events (joins, leaves and received text) on their way to the
    /// coordinator
    pub event_buffer_size: usize,
    /// Application broadcast requests not yet taken by the coordinator
    pub broadcast_buffer_size: usize,
    /// Per-peer queue of text waiting to be written
    pub outbound_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 64,
            broadcast_buffer_size: 1,
            outbound_buffer_size: 32,
        }
    }
}

impl ChannelConfig {
    /// Every buffer must hold at least one element
    pub fn validate(&self) -> Result<(), ChatError> {
        let sizes = [
            ("event_buffer_size", self.event_buffer_size),
            ("broadcast_buffer_size", self.broadcast_buffer_size),
            ("outbound_buffer_size", self.outbound_buffer_size),
        ];

        match sizes.iter().find(|(_, size)| *size == 0) {
            Some((name, _)) => Err(ChatError::InvalidConfiguration {
                reason: format!("{} must be greater than zero", name),
            }),
            None => Ok(()),
        }
    }
}
