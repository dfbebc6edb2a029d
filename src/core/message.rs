//! Chat payloads carried in STOMP frame bodies (JSON, camelCase keys).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::types::{ChatError, ChatResult};

/// File attached to a chat message. Attachments travel by reference (URL), never inline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Message published by the server on a topic, including echoes of the caller's own sends.
///
/// `sent_at` is kept as the server's ISO-8601 string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub message_id: i64,
    pub sender_id: i64,
    pub conversation_id: i64,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub sent_at: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl InboundMessage {
    pub fn from_json(body: &[u8]) -> ChatResult<Self> {
        sonic_rs::from_slice(body)
            .map_err(|e| ChatError::Protocol(format!("malformed message body: {e}")))
    }
}

/// Payload published by `send_message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: i64,
    pub conversation_id: i64,
    pub content: String,
    pub sent_at: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sender_first_name: String,
    pub avatar_url: Option<String>,
}

impl OutgoingMessage {
    pub fn to_json(&self) -> ChatResult<Bytes> {
        sonic_rs::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| ChatError::Serialization(e.to_string()))
    }

    /// Whether `inbound` is the echo of this payload.
    ///
    /// Correlation is by `(sender_id, content)` within the conversation: two identical sends
    /// from the same sender in flight at once cannot be told apart, and the first echo completes
    /// the oldest of them.
    #[inline]
    pub fn is_echoed_by(&self, inbound: &InboundMessage) -> bool {
        inbound.conversation_id == self.conversation_id
            && inbound.sender_id == self.sender_id
            && inbound.content == self.content
    }
}
