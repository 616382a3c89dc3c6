//! UseCase: read receipts.
//!
//! A batch of receipts is all-or-nothing: either every listed message gets a
//! receipt (where one is missing) and the reader's `lastReadAt` advances, or
//! nothing changes.

use std::{collections::HashSet, sync::Arc};

use huddle_shared::time::Clock;

use crate::domain::{
    BroadcastDispatcher, ConnectionId, ConversationId, MessageId, ServerEvent, Timestamp,
    Transaction, TransactionManager, UserId, event::MessagesRead,
};

use super::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub conversation_id: ConversationId,
    pub message_ids: Vec<MessageId>,
    /// Messages that did not carry a receipt from the reader before
    pub newly_read: Vec<MessageId>,
    pub read_at: Timestamp,
}

pub struct ReadReceiptSynchronizer {
    transactions: Arc<dyn TransactionManager>,
    dispatcher: Arc<dyn BroadcastDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ReadReceiptSynchronizer {
    pub fn new(
        transactions: Arc<dyn TransactionManager>,
        dispatcher: Arc<dyn BroadcastDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions,
            dispatcher,
            clock,
        }
    }

    /// Mark messages read by `reader` and tell the rest of the room.
    ///
    /// The `messagesRead` event goes to every subscriber of the conversation
    /// except `origin`.
    pub async fn mark_messages_read(
        &self,
        reader: &UserId,
        origin: &ConnectionId,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<ReadOutcome, ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;
        if message_ids.is_empty() {
            return Err(ChatError::Validation("messageIds must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(message_ids.len());
        for raw in message_ids {
            let id = MessageId::new(raw.clone())?;
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        let read_at = Timestamp::new(self.clock.now_millis());
        let mut tx = self.transactions.begin().await?;
        let newly_read =
            match apply_receipts(tx.as_mut(), reader, &conversation_id, &ids, read_at).await {
                Ok(newly_read) => newly_read,
                Err(e) => {
                    tx.rollback().await;
                    return Err(e);
                }
            };
        tx.commit().await?;

        tracing::info!(
            "User {} read {} message(s) in conversation {} ({} new)",
            reader,
            ids.len(),
            conversation_id,
            newly_read.len()
        );
        self.dispatcher.to_room_except(
            &conversation_id,
            origin,
            &ServerEvent::MessagesRead(MessagesRead {
                user_id: reader.clone(),
                conversation_id: conversation_id.clone(),
                message_ids: ids.clone(),
                read_at,
            }),
        );

        Ok(ReadOutcome {
            conversation_id,
            message_ids: ids,
            newly_read,
            read_at,
        })
    }
}

async fn apply_receipts(
    tx: &mut dyn Transaction,
    reader: &UserId,
    conversation_id: &ConversationId,
    ids: &[MessageId],
    read_at: Timestamp,
) -> Result<Vec<MessageId>, ChatError> {
    let mut participant = tx
        .find_participant(conversation_id, reader)
        .await?
        .ok_or_else(|| {
            ChatError::NotFound(format!(
                "participant '{}' in conversation '{}'",
                reader, conversation_id
            ))
        })?;

    let mut newly_read = Vec::new();
    for id in ids {
        let mut message = tx
            .find_message(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message '{}'", id)))?;
        if &message.conversation_id != conversation_id {
            return Err(ChatError::Validation(format!(
                "message '{}' does not belong to conversation '{}'",
                id, conversation_id
            )));
        }
        if message.mark_read_by(reader, read_at) {
            tx.update_message(message).await?;
            newly_read.push(id.clone());
        }
    }

    if participant.advance_last_read(read_at) {
        tx.save_participant(participant).await?;
    }
    Ok(newly_read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Message, MessageContent, MessageRepository, ParticipantRepository},
        infrastructure::{dispatcher::RecordingDispatcher, repository::InMemoryStore},
        usecase::test_support::{
            FailingCommitManager, clock, conversation, observer, seeded_store, user,
        },
    };

    async fn post(store: &InMemoryStore, id: &str, conversation_id: &str, sender: &str) {
        let mut tx = store.begin().await.unwrap();
        tx.insert_message(Message::new(
            MessageId::new(id.to_string()).unwrap(),
            MessageContent::new("hi".to_string()).unwrap(),
            conversation(conversation_id),
            user(sender),
            Timestamp::new(500),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        // テスト項目: 同じメッセージを二度既読にしても既読記録は一つだけ
        // given (前提条件):
        let store = seeded_store().await;
        post(&store, "m1", "c1", "alice").await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let sync = ReadReceiptSynchronizer::new(
            Arc::new(store.clone()),
            dispatcher.clone(),
            clock(),
        );

        // when (操作):
        let first = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1"]))
            .await
            .unwrap();
        let second = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1", "m1"]))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(first.newly_read.len(), 1);
        assert!(second.newly_read.is_empty());
        assert_eq!(second.message_ids.len(), 1);
        let message = store
            .find_message(&MessageId::new("m1".to_string()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.read_by.len(), 1);
        let participant = store
            .find_participant(&conversation("c1"), &user("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participant.last_read_at, Some(Timestamp::new(1_000)));
    }

    #[tokio::test]
    async fn test_partially_read_batch_only_adds_missing_receipts() {
        // テスト項目: 既読済みの m1 は変わらず、未読の m2 だけに既読が追加される
        // given (前提条件):
        let store = seeded_store().await;
        post(&store, "m1", "c1", "alice").await;
        post(&store, "m2", "c1", "alice").await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let clock = clock();
        let sync = ReadReceiptSynchronizer::new(
            Arc::new(store.clone()),
            dispatcher.clone(),
            clock.clone(),
        );
        sync.mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1"]))
            .await
            .unwrap();
        clock.advance(500);

        // when (操作):
        let outcome = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1", "m2"]))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.newly_read, vec![MessageId::new("m2".to_string()).unwrap()]);
        let m1 = store
            .find_message(&MessageId::new("m1".to_string()).unwrap())
            .await
            .unwrap()
            .unwrap();
        let m2 = store
            .find_message(&MessageId::new("m2".to_string()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m1.read_by.len(), 1);
        assert_eq!(m1.read_by[0].read_at, Timestamp::new(1_000));
        assert_eq!(m2.read_by.len(), 1);
        assert_eq!(m2.read_by[0].read_at, Timestamp::new(1_500));
        let participant = store
            .find_participant(&conversation("c1"), &user("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participant.last_read_at, Some(Timestamp::new(1_500)));
    }

    #[tokio::test]
    async fn test_receipt_goes_to_everyone_but_the_reader() {
        // テスト項目: 既読通知は既読にした接続以外のルーム参加者に届く
        // given (前提条件):
        let store = seeded_store().await;
        post(&store, "m1", "c1", "alice").await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let alice_conn = observer(&dispatcher, "alice", &["c1"]);
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let sync = ReadReceiptSynchronizer::new(
            Arc::new(store.clone()),
            dispatcher.clone(),
            clock(),
        );

        // when (操作):
        sync.mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1"]))
            .await
            .unwrap();

        // then (期待する結果):
        assert!(dispatcher.events_for(&bob_conn).is_empty());
        let events = dispatcher.events_for(&alice_conn);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::MessagesRead(read) => {
                assert_eq!(read.user_id, user("bob"));
                assert_eq!(read.read_at, Timestamp::new(1_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_message_rolls_back_whole_batch() {
        // テスト項目: 一つでも存在しないメッセージがあればバッチ全体が取り消される
        // given (前提条件):
        let store = seeded_store().await;
        post(&store, "m1", "c1", "alice").await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let alice_conn = observer(&dispatcher, "alice", &["c1"]);
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let sync = ReadReceiptSynchronizer::new(
            Arc::new(store.clone()),
            dispatcher.clone(),
            clock(),
        );

        // when (操作):
        let result = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1", "ghost"]))
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        let message = store
            .find_message(&MessageId::new("m1".to_string()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(message.read_by.is_empty());
        assert!(dispatcher.events_for(&alice_conn).is_empty());
    }

    #[tokio::test]
    async fn test_message_from_other_conversation_is_rejected() {
        // テスト項目: 別の会話のメッセージを既読にしようとすると検証エラー
        // given (前提条件):
        let store = seeded_store().await;
        post(&store, "m9", "elsewhere", "alice").await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let sync = ReadReceiptSynchronizer::new(Arc::new(store.clone()), dispatcher, clock());

        // when (操作):
        let result = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m9"]))
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        // テスト項目: 空の messageIds は検証エラー
        // given (前提条件):
        let store = seeded_store().await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let sync = ReadReceiptSynchronizer::new(Arc::new(store.clone()), dispatcher, clock());

        // when (操作):
        let result = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &[])
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn test_commit_failure_sends_nothing() {
        // テスト項目: コミット失敗時は既読が保存されず通知もされない
        // given (前提条件):
        let store = seeded_store().await;
        post(&store, "m1", "c1", "alice").await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let alice_conn = observer(&dispatcher, "alice", &["c1"]);
        let bob_conn = observer(&dispatcher, "bob", &["c1"]);
        let sync = ReadReceiptSynchronizer::new(
            Arc::new(FailingCommitManager {
                inner: store.clone(),
            }),
            dispatcher.clone(),
            clock(),
        );

        // when (操作):
        let result = sync
            .mark_messages_read(&user("bob"), &bob_conn, "c1", &ids(&["m1"]))
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::Transaction(_))));
        let message = store
            .find_message(&MessageId::new("m1".to_string()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(message.read_by.is_empty());
        assert!(dispatcher.events_for(&alice_conn).is_empty());
    }
}
