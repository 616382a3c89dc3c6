//! Fixture loading for the in-memory store.
//!
//! Account management is handled elsewhere; a JSON seed file is how users,
//! conversations and memberships get into a standalone server.
//!
//! ```json
//! {
//!   "users": [{ "id": "alice", "name": "Alice" }],
//!   "conversations": [{ "id": "general", "type": "GROUP", "name": "General" }],
//!   "participants": [{ "userId": "alice", "conversationId": "general", "role": "admin" }]
//! }
//! ```

use std::{collections::HashSet, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{Conversation, Participant, User};

use super::repository::InMemoryStore;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid seed data: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub users: Vec<User>,
    pub conversations: Vec<Conversation>,
    pub participants: Vec<Participant>,
}

impl SeedData {
    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        let data: SeedData = serde_json::from_str(raw)?;
        data.validate()?;
        Ok(data)
    }

    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Every participant must reference a known user and conversation
    fn validate(&self) -> Result<(), SeedError> {
        let users: HashSet<_> = self.users.iter().map(|u| &u.id).collect();
        let conversations: HashSet<_> = self.conversations.iter().map(|c| &c.id).collect();
        for participant in &self.participants {
            if !users.contains(&participant.user_id) {
                return Err(SeedError::Invalid(format!(
                    "participant references unknown user '{}'",
                    participant.user_id
                )));
            }
            if !conversations.contains(&participant.conversation_id) {
                return Err(SeedError::Invalid(format!(
                    "participant references unknown conversation '{}'",
                    participant.conversation_id
                )));
            }
        }
        Ok(())
    }

    /// Load everything into `store`
    pub async fn apply(self, store: &InMemoryStore) {
        let SeedData {
            users,
            conversations,
            participants,
        } = self;

        for user in users {
            store.insert_user(user).await;
        }
        for conversation in conversations {
            let members: Vec<Participant> = participants
                .iter()
                .filter(|p| p.conversation_id == conversation.id)
                .cloned()
                .collect();
            store.insert_conversation(conversation, members).await;
        }
    }
}
