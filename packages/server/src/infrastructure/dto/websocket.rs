//! Inbound WebSocket events (client -> coordinator).
//!
//! Frames use the same envelope as outbound events:
//! `{"event": "<name>", "data": ...}`. Ids stay raw strings here and are
//! validated by the use cases, so malformed ids surface as validation errors
//! rather than parse failures.

use serde::Deserialize;

/// A conversation reference, sent either bare or wrapped in an object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConversationRef {
    Id(String),
    #[serde(rename_all = "camelCase")]
    Object { conversation_id: String },
}

impl ConversationRef {
    pub fn into_id(self) -> String {
        match self {
            ConversationRef::Id(id) => id,
            ConversationRef::Object { conversation_id } => conversation_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub conversation_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkMessagesReadRequest {
    pub conversation_id: String,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinChat(ConversationRef),
    LeaveChat(ConversationRef),
    Typing(TypingRequest),
    SendMessage(SendMessageRequest),
    MarkMessagesRead(MarkMessagesReadRequest),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Label used in error events when handling fails
    pub fn failure_label(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat(_) => "Failed to join chat",
            ClientEvent::LeaveChat(_) => "Failed to leave chat",
            ClientEvent::Typing(_) => "Failed to handle typing event",
            ClientEvent::SendMessage(_) => "Failed to send message",
            ClientEvent::MarkMessagesRead(_) => "Failed to mark messages as read",
        }
    }
}
