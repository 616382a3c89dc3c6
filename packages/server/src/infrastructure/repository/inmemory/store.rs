use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Conversation, ConversationId, ConversationRepository, Message, MessageId, MessageRepository,
    Participant, ParticipantRepository, RepositoryError, Timestamp, Transaction,
    TransactionManager, User, UserId, UserRepository,
};

use super::transaction::InMemoryTransaction;

/// Tables of the in-memory store
#[derive(Debug, Default)]
pub(super) struct Tables {
    pub(super) users: HashMap<UserId, User>,
    pub(super) conversations: HashMap<ConversationId, Conversation>,
    pub(super) messages: HashMap<MessageId, Message>,
    /// Message ids per conversation, in commit order
    pub(super) conversation_messages: HashMap<ConversationId, Vec<MessageId>>,
    pub(super) participants: HashMap<(ConversationId, UserId), Participant>,
}

impl Tables {
    pub(super) fn participants_of(&self, conversation_id: &ConversationId) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .participants
            .values()
            .filter(|p| &p.conversation_id == conversation_id)
            .cloned()
            .collect();
        sort_participants(&mut participants);
        participants
    }
}

pub(super) fn sort_participants(participants: &mut [Participant]) {
    participants.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

/// インメモリ Store 実装
///
/// Implements every repository trait plus [`TransactionManager`]. Cloning is
/// cheap and clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        let mut tables = self.tables.lock().await;
        tables.users.insert(user.id.clone(), user);
    }

    /// Insert a conversation with its participants, bypassing transactions.
    ///
    /// Used for seeding; participant refs on the conversation are filled in.
    pub async fn insert_conversation(
        &self,
        mut conversation: Conversation,
        participants: Vec<Participant>,
    ) {
        let mut tables = self.tables.lock().await;
        for participant in participants {
            conversation.add_participant_ref(participant.user_id.clone());
            tables.participants.insert(
                (conversation.id.clone(), participant.user_id.clone()),
                participant,
            );
        }
        tables
            .conversation_messages
            .entry(conversation.id.clone())
            .or_default();
        tables
            .conversations
            .insert(conversation.id.clone(), conversation);
    }

    pub async fn count_messages(&self, conversation_id: &ConversationId) -> usize {
        let tables = self.tables.lock().await;
        tables
            .conversation_messages
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(user_id).cloned())
    }

    async fn update_last_seen(
        &self,
        user_id: &UserId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user '{}'", user_id)))?;
        user.last_seen = Some(at);
        Ok(())
    }
}

#[async_trait]
impl ParticipantRepository for InMemoryStore {
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Participant>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut memberships: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        Ok(memberships)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.participants_of(conversation_id))
    }

    async fn find_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .participants
            .get(&(conversation_id.clone(), user_id.clone()))
            .cloned())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.lock().await;
        let Some(ids) = tables.conversation_messages.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let mut messages: Vec<Message> = ids
            .iter()
            .filter_map(|id| tables.messages.get(id).cloned())
            .collect();
        // stable: equal timestamps keep commit order
        messages.sort_by_key(|m| m.created_at);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn find_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Message>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.messages.get(message_id).cloned())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn find_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.conversations.get(conversation_id).cloned())
    }
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction::new(guard)))
    }
}
