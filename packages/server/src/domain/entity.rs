//! Domain entities owned by the persistence collaborator.

use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

/// A registered user, as far as the chat core needs to know about one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub last_seen: Option<Timestamp>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            last_seen: None,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Public identity attached to outbound messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Denormalized pointer to the most recent message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub message_id: MessageId,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub creator_id: Option<UserId>,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        kind: ConversationKind,
        name: Option<String>,
        creator_id: Option<UserId>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            kind,
            name,
            creator_id,
            participant_ids: Vec::new(),
            last_message: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Point `last_message` at a newer message.
    ///
    /// The pointer never moves backwards in time; an older message leaves it
    /// untouched and returns `false`.
    pub fn record_last_message(&mut self, last: LastMessage) -> bool {
        if let Some(current) = &self.last_message
            && current.timestamp > last.timestamp
        {
            return false;
        }
        self.last_message = Some(last);
        true
    }

    pub fn touch(&mut self, at: Timestamp) {
        self.updated_at = self.updated_at.max(at);
    }

    pub fn add_participant_ref(&mut self, user_id: UserId) {
        if !self.participant_ids.contains(&user_id) {
            self.participant_ids.push(user_id);
        }
    }

    pub fn remove_participant_ref(&mut self, user_id: &UserId) {
        self.participant_ids.retain(|id| id != user_id);
    }
}

/// One user's receipt for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: UserId,
    pub read_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: MessageContent,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub created_at: Timestamp,
    #[serde(default)]
    pub read_by: Vec<ReadReceipt>,
}

impl Message {
    pub fn new(
        id: MessageId,
        content: MessageContent,
        conversation_id: ConversationId,
        sender_id: UserId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            content,
            conversation_id,
            sender_id,
            created_at,
            read_by: Vec::new(),
        }
    }

    pub fn is_read_by(&self, user_id: &UserId) -> bool {
        self.read_by.iter().any(|r| &r.user_id == user_id)
    }

    /// Append a receipt for `user_id` unless one already exists.
    ///
    /// Returns `true` when a receipt was appended.
    pub fn mark_read_by(&mut self, user_id: &UserId, read_at: Timestamp) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id: user_id.clone(),
            read_at,
        });
        true
    }

    pub fn with_sender(self, sender: UserSummary) -> MessageView {
        MessageView {
            id: self.id,
            content: self.content.into_string(),
            conversation_id: self.conversation_id,
            sender,
            created_at: self.created_at,
            read_by: self.read_by,
        }
    }
}

/// A message with its sender's identity attached, as delivered to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub content: String,
    pub conversation_id: ConversationId,
    pub sender: UserSummary,
    pub created_at: Timestamp,
    pub read_by: Vec<ReadReceipt>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    #[default]
    Member,
}

/// Membership of one user in one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub joined_at: Timestamp,
    #[serde(default)]
    pub last_read_at: Option<Timestamp>,
}

impl Participant {
    pub fn new(
        user_id: UserId,
        conversation_id: ConversationId,
        role: ParticipantRole,
        joined_at: Timestamp,
    ) -> Self {
        Self {
            user_id,
            conversation_id,
            role,
            joined_at,
            last_read_at: None,
        }
    }

    /// Move `last_read_at` forward. Older timestamps are ignored.
    pub fn advance_last_read(&mut self, at: Timestamp) -> bool {
        match self.last_read_at {
            Some(current) if current >= at => false,
            _ => {
                self.last_read_at = Some(at);
                true
            }
        }
    }
}
