//! Fixtures shared by use case tests.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_shared::time::FixedClock;
use tokio::sync::mpsc;

use crate::{
    domain::{
        BroadcastDispatcher, ConnectionId, Conversation, ConversationId, ConversationKind,
        Message, MessageId, Participant, ParticipantRole, RepositoryError, Timestamp,
        Transaction, TransactionManager, User, UserId, auth::MockCredentialVerifier,
    },
    infrastructure::{dispatcher::RecordingDispatcher, repository::InMemoryStore},
};

use super::{
    ConnectionManager, DEFAULT_HISTORY_LIMIT, DEFAULT_TYPING_TIMEOUT, Directory, RoomStateStore,
    TypingTracker,
};

pub fn user(id: &str) -> UserId {
    UserId::new(id.to_string()).unwrap()
}

pub fn conversation(id: &str) -> ConversationId {
    ConversationId::new(id.to_string()).unwrap()
}

/// Store with alice, bob and carol; alice and bob share group `c1`
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
        store.insert_user(User::new(user(id), name)).await;
    }
    let c1 = Conversation::new(
        conversation("c1"),
        ConversationKind::Group,
        Some("general".to_string()),
        Some(user("alice")),
        Timestamp::new(0),
    );
    store
        .insert_conversation(
            c1,
            vec![
                Participant::new(
                    user("alice"),
                    conversation("c1"),
                    ParticipantRole::Admin,
                    Timestamp::new(0),
                ),
                Participant::new(
                    user("bob"),
                    conversation("c1"),
                    ParticipantRole::Member,
                    Timestamp::new(0),
                ),
            ],
        )
        .await;
    store
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(1_000))
}

pub fn directory(store: &InMemoryStore) -> Directory {
    let repo = Arc::new(store.clone());
    Directory {
        users: repo.clone(),
        memberships: repo.clone(),
        conversations: repo.clone(),
        messages: repo,
    }
}

/// Connection manager over `store` whose verifier accepts nothing
pub fn connection_manager(
    store: &InMemoryStore,
    rooms: Arc<RoomStateStore>,
    dispatcher: Arc<RecordingDispatcher>,
) -> Arc<ConnectionManager> {
    let clock = clock();
    let typing = TypingTracker::new(
        rooms.clone(),
        dispatcher.clone(),
        clock.clone(),
        DEFAULT_TYPING_TIMEOUT,
    );
    Arc::new(ConnectionManager::new(
        Arc::new(MockCredentialVerifier::new()),
        directory(store),
        rooms,
        typing,
        dispatcher,
        clock,
        DEFAULT_HISTORY_LIMIT,
    ))
}

/// Register a connection for `user_id` and subscribe it to `rooms`
pub fn observer(
    dispatcher: &RecordingDispatcher,
    user_id: &str,
    rooms: &[&str],
) -> ConnectionId {
    let connection_id = ConnectionId::generate();
    let (tx, _rx) = mpsc::unbounded_channel();
    dispatcher.register(connection_id, user(user_id), tx);
    for room in rooms {
        dispatcher.subscribe(&connection_id, &conversation(room));
    }
    connection_id
}

/// TransactionManager whose transactions always fail to commit
pub struct FailingCommitManager {
    pub inner: InMemoryStore,
}

#[async_trait]
impl TransactionManager for FailingCommitManager {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingCommit { inner }))
    }
}

struct FailingCommit {
    inner: Box<dyn Transaction>,
}

#[async_trait]
impl Transaction for FailingCommit {
    async fn find_conversation(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        self.inner.find_conversation(conversation_id).await
    }

    async fn save_conversation(
        &mut self,
        conversation: Conversation,
    ) -> Result<(), RepositoryError> {
        self.inner.save_conversation(conversation).await
    }

    async fn find_message(
        &mut self,
        message_id: &MessageId,
    ) -> Result<Option<Message>, RepositoryError> {
        self.inner.find_message(message_id).await
    }

    async fn insert_message(&mut self, message: Message) -> Result<(), RepositoryError> {
        self.inner.insert_message(message).await
    }

    async fn update_message(&mut self, message: Message) -> Result<(), RepositoryError> {
        self.inner.update_message(message).await
    }

    async fn find_participant(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        self.inner.find_participant(conversation_id, user_id).await
    }

    async fn list_participants(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        self.inner.list_participants(conversation_id).await
    }

    async fn save_participant(&mut self, participant: Participant) -> Result<(), RepositoryError> {
        self.inner.save_participant(participant).await
    }

    async fn delete_participant(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        self.inner.delete_participant(conversation_id, user_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.inner.rollback().await;
        Err(RepositoryError::Aborted("simulated commit failure".to_string()))
    }

    async fn rollback(self: Box<Self>) {
        self.inner.rollback().await;
    }
}
