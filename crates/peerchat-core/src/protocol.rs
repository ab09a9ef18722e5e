//! The `chat` wire protocol
//!
//! A protocol is identified by name and version and declares how many message
//! codes it uses. `chat` v1 has a single code, [`TEXT_MSG`], whose payload is one
//! bincode-encoded string (little-endian u64 length followed by UTF-8 bytes).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

// ----------------------------------------------------------------------------
// Protocol Descriptor
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub name: &'static str,
    pub version: u32,
    /// Number of message codes; valid codes are `0..length`
    pub length: u64,
}

impl Protocol {
    pub fn accepts(&self, code: u64) -> bool {
        code < self.length
    }
}

pub const CHAT_PROTOCOL: Protocol = Protocol {
    name: "chat",
    version: 1,
    length: 1,
};

/// Code of the text message, the only message `chat` v1 defines
pub const TEXT_MSG: u64 = 0;

// ----------------------------------------------------------------------------
// Wire Message
// ----------------------------------------------------------------------------

/// One protocol message: a code and its still-encoded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    pub code: u64,
    pub payload: Vec<u8>,
}

impl Msg {
    pub fn new(code: u64, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    /// Encode `value` as the payload of a message with the given code
    pub fn encode<T: Serialize + ?Sized>(code: u64, value: &T) -> Result<Self, TransportError> {
        let payload = bincode::serialize(value).map_err(TransportError::encode)?;
        Ok(Self { code, payload })
    }

    pub fn text(text: &str) -> Result<Self, TransportError> {
        Self::encode(TEXT_MSG, text)
    }

    /// Decode the payload; failures are reported as [`TransportError::Decode`]
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        bincode::deserialize(&self.payload).map_err(TransportError::decode)
    }
}
