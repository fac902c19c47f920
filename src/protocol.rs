//! Peer-to-peer wire messages.
//!
//! Every frame is a JSON envelope `{"type": 0|1|2, "data": ...}`. Queries
//! carry `null`; a chain response carries the JSON *text* of a block array
//! (a lone block object is accepted as well).

use crate::block::Block;
use crate::error::{Result, SerializationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric tag of each message on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    QueryLatest = 0,
    QueryAll = 1,
    ResponseChain = 2,
}

impl TryFrom<u8> for MessageType {
    type Error = SerializationError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::QueryLatest),
            1 => Ok(MessageType::QueryAll),
            2 => Ok(MessageType::ResponseChain),
            other => Err(SerializationError::malformed(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::QueryLatest => write!(f, "QUERY_LATEST"),
            MessageType::QueryAll => write!(f, "QUERY_ALL"),
            MessageType::ResponseChain => write!(f, "RESPONSE_BLOCKCHAIN"),
        }
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Ask for the peer's latest block
    QueryLatest,
    /// Ask for the peer's whole chain
    QueryAll,
    /// A chain, or just its tip
    ResponseChain(Vec<Block>),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: u8,
    data: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlockPayload {
    Many(Vec<Block>),
    One(Block),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::QueryLatest => MessageType::QueryLatest,
            Message::QueryAll => MessageType::QueryAll,
            Message::ResponseChain(_) => MessageType::ResponseChain,
        }
    }

    /// Serialize to the wire envelope
    pub fn encode(&self) -> Result<String> {
        let data = match self {
            Message::QueryLatest | Message::QueryAll => None,
            Message::ResponseChain(blocks) => Some(serde_json::to_string(blocks)?),
        };
        let envelope = Envelope {
            kind: self.message_type() as u8,
            data,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse a wire envelope. Anything that does not decode cleanly is a
    /// [`SerializationError::MalformedMessage`].
    pub fn decode(frame: &str) -> std::result::Result<Self, SerializationError> {
        let envelope: Envelope = serde_json::from_str(frame)
            .map_err(|e| SerializationError::malformed(format!("bad envelope: {}", e)))?;

        match MessageType::try_from(envelope.kind)? {
            MessageType::QueryLatest => Ok(Message::QueryLatest),
            MessageType::QueryAll => Ok(Message::QueryAll),
            MessageType::ResponseChain => {
                let text = envelope
                    .data
                    .ok_or_else(|| SerializationError::malformed("response without data"))?;
                let payload: BlockPayload = serde_json::from_str(&text)
                    .map_err(|e| SerializationError::malformed(format!("bad blocks: {}", e)))?;
                Ok(Message::ResponseChain(match payload {
                    BlockPayload::Many(blocks) => blocks,
                    BlockPayload::One(block) => vec![block],
                }))
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::ResponseChain(blocks) => {
                write!(f, "{} ({} blocks)", self.message_type(), blocks.len())
            }
            _ => write!(f, "{}", self.message_type()),
        }
    }
}
