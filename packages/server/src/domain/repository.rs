//! Repository trait 定義
//!
//! Interfaces of the persistence collaborator. The chat core only ever talks
//! to storage through these traits; `infrastructure` supplies implementations.
//!
//! Reads outside a transaction go through the plain repositories. Every
//! multi-record write goes through a [`Transaction`] obtained from a
//! [`TransactionManager`]: staged writes become visible on `commit` and only
//! then. Dropping a transaction without committing rolls it back.

use async_trait::async_trait;

use super::{
    Conversation, ConversationId, Message, MessageId, Participant, RepositoryError, Timestamp,
    User, UserId,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn update_last_seen(&self, user_id: &UserId, at: Timestamp)
    -> Result<(), RepositoryError>;
}

/// Membership loader
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Every conversation membership of a user
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Participant>, RepositoryError>;

    async fn list_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError>;

    async fn find_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// The most recent `limit` messages of a conversation, oldest first
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn find_message(&self, message_id: &MessageId)
    -> Result<Option<Message>, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;
}

/// Opens transactional boundaries on the store
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError>;
}

/// A unit of work spanning several records.
///
/// Reads inside the transaction observe its own staged writes.
#[async_trait]
pub trait Transaction: Send {
    async fn find_conversation(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Insert or replace a conversation record
    async fn save_conversation(&mut self, conversation: Conversation)
    -> Result<(), RepositoryError>;

    async fn find_message(
        &mut self,
        message_id: &MessageId,
    ) -> Result<Option<Message>, RepositoryError>;

    /// Insert a new message. Fails with `Conflict` if the id is taken.
    async fn insert_message(&mut self, message: Message) -> Result<(), RepositoryError>;

    /// Replace an existing message. Fails with `NotFound` if it does not exist.
    async fn update_message(&mut self, message: Message) -> Result<(), RepositoryError>;

    async fn find_participant(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError>;

    async fn list_participants(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError>;

    /// Insert or replace a participant record
    async fn save_participant(&mut self, participant: Participant)
    -> Result<(), RepositoryError>;

    /// Delete a participant record, returning whether one existed
    async fn delete_participant(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>);
}
