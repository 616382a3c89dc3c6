//! Outbound events emitted by the coordinator.
//!
//! Serialized as `{"event": "<name>", "data": {...}}` frames.

use serde::Serialize;

use super::{ConversationId, MessageId, MessageView, RoomSnapshot, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ChatStateSync(RoomSnapshot),
    UserTyping(UserTyping),
    NewMessage(NewMessage),
    UserStatus(UserStatus),
    ChatHistory(ChatHistory),
    UserJoinedChat(RoomMembership),
    UserLeftChat(RoomMembership),
    MessagesRead(MessagesRead),
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ChatStateSync(_) => "chatStateSync",
            ServerEvent::UserTyping(_) => "userTyping",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::UserStatus(_) => "userStatus",
            ServerEvent::ChatHistory(_) => "chatHistory",
            ServerEvent::UserJoinedChat(_) => "userJoinedChat",
            ServerEvent::UserLeftChat(_) => "userLeftChat",
            ServerEvent::MessagesRead(_) => "messagesRead",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn typing(
        user_id: UserId,
        conversation_id: ConversationId,
        timestamp: Timestamp,
        is_typing: bool,
    ) -> Self {
        ServerEvent::UserTyping(UserTyping {
            user_id,
            conversation_id,
            timestamp,
            is_typing,
        })
    }

    pub fn error(error: impl Into<String>, details: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            error: error.into(),
            details: details.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub timestamp: Timestamp,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub conversation_id: ConversationId,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMembership {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub message_ids: Vec<MessageId>,
    pub read_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: String,
    pub details: String,
}
