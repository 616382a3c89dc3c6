use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    Conversation, ConversationId, Message, MessageId, Participant, RepositoryError, Transaction,
    UserId,
};

use super::store::{Tables, sort_participants};

/// Writes staged by a transaction, applied on commit
#[derive(Debug, Default)]
struct StagedWrites {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<MessageId, Message>,
    /// Newly inserted message ids, in insertion order
    inserted: Vec<MessageId>,
    /// `None` marks a deletion
    participants: HashMap<(ConversationId, UserId), Option<Participant>>,
}

/// Transaction over [`super::InMemoryStore`].
///
/// Holds the store lock until it is committed, rolled back or dropped.
pub struct InMemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    staged: StagedWrites,
}

impl InMemoryTransaction {
    pub(super) fn new(tables: OwnedMutexGuard<Tables>) -> Self {
        Self {
            tables,
            staged: StagedWrites::default(),
        }
    }

    fn message_exists(&self, message_id: &MessageId) -> bool {
        self.staged.messages.contains_key(message_id) || self.tables.messages.contains_key(message_id)
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn find_conversation(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .staged
            .conversations
            .get(conversation_id)
            .or_else(|| self.tables.conversations.get(conversation_id))
            .cloned())
    }

    async fn save_conversation(
        &mut self,
        conversation: Conversation,
    ) -> Result<(), RepositoryError> {
        self.staged
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn find_message(
        &mut self,
        message_id: &MessageId,
    ) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .staged
            .messages
            .get(message_id)
            .or_else(|| self.tables.messages.get(message_id))
            .cloned())
    }

    async fn insert_message(&mut self, message: Message) -> Result<(), RepositoryError> {
        if self.message_exists(&message.id) {
            return Err(RepositoryError::Conflict(format!(
                "message '{}' already exists",
                message.id
            )));
        }
        self.staged.inserted.push(message.id.clone());
        self.staged.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn update_message(&mut self, message: Message) -> Result<(), RepositoryError> {
        if !self.message_exists(&message.id) {
            return Err(RepositoryError::NotFound(format!(
                "message '{}'",
                message.id
            )));
        }
        self.staged.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn find_participant(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let key = (conversation_id.clone(), user_id.clone());
        match self.staged.participants.get(&key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.tables.participants.get(&key).cloned()),
        }
    }

    async fn list_participants(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let mut merged: HashMap<UserId, Participant> = self
            .tables
            .participants_of(conversation_id)
            .into_iter()
            .map(|p| (p.user_id.clone(), p))
            .collect();
        for ((staged_conversation, user_id), staged) in &self.staged.participants {
            if staged_conversation != conversation_id {
                continue;
            }
            match staged {
                Some(participant) => {
                    merged.insert(user_id.clone(), participant.clone());
                }
                None => {
                    merged.remove(user_id);
                }
            }
        }
        let mut participants: Vec<Participant> = merged.into_values().collect();
        sort_participants(&mut participants);
        Ok(participants)
    }

    async fn save_participant(
        &mut self,
        participant: Participant,
    ) -> Result<(), RepositoryError> {
        let key = (
            participant.conversation_id.clone(),
            participant.user_id.clone(),
        );
        self.staged.participants.insert(key, Some(participant));
        Ok(())
    }

    async fn delete_participant(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let existed = self.find_participant(conversation_id, user_id).await?.is_some();
        if existed {
            self.staged
                .participants
                .insert((conversation_id.clone(), user_id.clone()), None);
        }
        Ok(existed)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let InMemoryTransaction { mut tables, staged } = *self;

        for (id, conversation) in staged.conversations {
            tables.conversation_messages.entry(id.clone()).or_default();
            tables.conversations.insert(id, conversation);
        }
        for id in staged.inserted {
            if let Some(message) = staged.messages.get(&id) {
                tables
                    .conversation_messages
                    .entry(message.conversation_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        for (id, message) in staged.messages {
            tables.messages.insert(id, message);
        }
        for (key, participant) in staged.participants {
            match participant {
                Some(participant) => {
                    tables.participants.insert(key, participant);
                }
                None => {
                    tables.participants.remove(&key);
                }
            }
        }

        tracing::debug!("In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        tracing::debug!(
            "In-memory transaction rolled back ({} staged messages discarded)",
            self.staged.messages.len()
        );
    }
}
