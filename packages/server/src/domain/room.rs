//! Ephemeral per-conversation state: who is online and who is typing.
//!
//! Nothing here is persisted. A `RoomState` is rebuilt entirely from
//! connection events.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{ConnectionId, ConversationId, Timestamp, UserId};

/// Key of a typing indicator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingKey {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}

impl TypingKey {
    pub fn new(user_id: UserId, conversation_id: ConversationId) -> Self {
        Self {
            user_id,
            conversation_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEntry {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub started_at: Timestamp,
}

/// Full view of a room, published after every mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub conversation_id: ConversationId,
    pub online_users: Vec<UserId>,
    pub typing_users: Vec<TypingEntry>,
}

#[derive(Debug, Default)]
pub struct RoomState {
    /// user -> connections of that user currently joined to the room
    online: HashMap<UserId, HashSet<ConnectionId>>,
    typing: HashMap<UserId, TypingEntry>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `connection_id` (owned by `user_id`) joined the room.
    ///
    /// Returns `true` if the user was not online in this room before.
    pub fn join(&mut self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        let connections = self.online.entry(user_id.clone()).or_default();
        let was_offline = connections.is_empty();
        connections.insert(connection_id);
        was_offline
    }

    /// Record that `connection_id` left the room.
    ///
    /// Returns `true` if that was the user's last connection in the room.
    pub fn leave(&mut self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let Some(connections) = self.online.get_mut(user_id) else {
            return false;
        };
        if !connections.remove(connection_id) {
            return false;
        }
        if connections.is_empty() {
            self.online.remove(user_id);
            return true;
        }
        false
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online.contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Insert or refresh a typing entry, returning the replaced one
    pub fn set_typing(&mut self, entry: TypingEntry) -> Option<TypingEntry> {
        self.typing.insert(entry.user_id.clone(), entry)
    }

    pub fn clear_typing(&mut self, user_id: &UserId) -> Option<TypingEntry> {
        self.typing.remove(user_id)
    }

    pub fn typing_entry(&self, user_id: &UserId) -> Option<&TypingEntry> {
        self.typing.get(user_id)
    }

    /// Build a snapshot with users sorted by id for stable output
    pub fn snapshot(&self, conversation_id: &ConversationId) -> RoomSnapshot {
        let mut online_users: Vec<UserId> = self.online.keys().cloned().collect();
        online_users.sort();

        let mut typing_users: Vec<TypingEntry> = self.typing.values().cloned().collect();
        typing_users.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        RoomSnapshot {
            conversation_id: conversation_id.clone(),
            online_users,
            typing_users,
        }
    }
}
