//! UseCase: typing indicators with automatic expiry.
//!
//! Each (user, conversation) pair has at most one live entry and one timer.
//! Refreshing an entry replaces the timer; a timer that fires after being
//! cancelled or replaced does nothing (see `PresenceTable::claim_expired_timer`).

use std::{sync::Arc, time::Duration};

use huddle_shared::time::Clock;

use crate::domain::{
    BroadcastDispatcher, ConversationId, ServerEvent, Timestamp, TypingEntry, TypingKey, UserId,
};

use super::room_state::{PresenceTable, RoomStateStore};

/// Default inactivity window before a typing indicator expires
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone)]
pub struct TypingTracker {
    store: Arc<RoomStateStore>,
    dispatcher: Arc<dyn BroadcastDispatcher>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl TypingTracker {
    pub fn new(
        store: Arc<RoomStateStore>,
        dispatcher: Arc<dyn BroadcastDispatcher>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            timeout,
        }
    }

    /// Start, refresh or stop typing and publish the resulting room snapshot
    pub async fn set_typing(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        is_typing: bool,
    ) {
        let mut table = self.store.lock().await;
        self.apply_locked(&mut table, user_id, conversation_id, is_typing);
    }

    /// Same as `set_typing`, for callers already holding the table lock
    pub(crate) fn apply_locked(
        &self,
        table: &mut PresenceTable,
        user_id: &UserId,
        conversation_id: &ConversationId,
        is_typing: bool,
    ) {
        if is_typing {
            self.start_locked(table, user_id, conversation_id);
        } else {
            self.stop_locked(table, user_id, conversation_id, true);
        }
        self.dispatcher.to_room(
            conversation_id,
            &ServerEvent::ChatStateSync(table.snapshot(conversation_id)),
        );
    }

    /// Clear typing before a message is persisted.
    ///
    /// Emits `isTyping: false` and a snapshot only if the user was typing.
    pub async fn stop_before_send(&self, user_id: &UserId, conversation_id: &ConversationId) {
        let mut table = self.store.lock().await;
        self.stop_silently_locked(&mut table, user_id, conversation_id);
    }

    /// Clear typing again and deliver `event` to the room under the same lock.
    ///
    /// A typing entry set after `stop_before_send` cannot be seen next to the
    /// delivered message.
    pub async fn publish_after_stop(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        event: &ServerEvent,
    ) {
        let mut table = self.store.lock().await;
        self.stop_silently_locked(&mut table, user_id, conversation_id);
        self.dispatcher.to_room(conversation_id, event);
    }

    fn stop_silently_locked(
        &self,
        table: &mut PresenceTable,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) {
        if self.stop_locked(table, user_id, conversation_id, false) {
            self.dispatcher.to_room(
                conversation_id,
                &ServerEvent::ChatStateSync(table.snapshot(conversation_id)),
            );
        }
    }

    fn start_locked(
        &self,
        table: &mut PresenceTable,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) {
        let now = Timestamp::new(self.clock.now_millis());
        let key = TypingKey::new(user_id.clone(), conversation_id.clone());

        table.cancel_timer(&key);
        table.room_mut(conversation_id).set_typing(TypingEntry {
            user_id: user_id.clone(),
            conversation_id: conversation_id.clone(),
            started_at: now,
        });

        let generation = table.next_generation();
        let tracker = self.clone();
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(tracker.timeout).await;
            tracker.expire(timer_key, generation).await;
        })
        .abort_handle();
        table.install_timer(key, generation, handle);

        tracing::debug!(
            "Typing started: user={}, conversation={}",
            user_id,
            conversation_id
        );
        self.dispatcher.to_room(
            conversation_id,
            &ServerEvent::typing(user_id.clone(), conversation_id.clone(), now, true),
        );
    }

    /// Remove the entry and its timer.
    ///
    /// `isTyping: false` goes out when an entry existed or `announce` is set.
    /// Returns whether an entry existed.
    pub(crate) fn stop_locked(
        &self,
        table: &mut PresenceTable,
        user_id: &UserId,
        conversation_id: &ConversationId,
        announce: bool,
    ) -> bool {
        let key = TypingKey::new(user_id.clone(), conversation_id.clone());
        let existed = table.clear_typing(&key).is_some();
        if existed || announce {
            let now = Timestamp::new(self.clock.now_millis());
            self.dispatcher.to_room(
                conversation_id,
                &ServerEvent::typing(user_id.clone(), conversation_id.clone(), now, false),
            );
        }
        existed
    }

    async fn expire(&self, key: TypingKey, generation: u64) {
        let mut table = self.store.lock().await;
        if !table.claim_expired_timer(&key, generation) {
            return;
        }
        if let Some(room) = table.room_mut_if_exists(&key.conversation_id) {
            room.clear_typing(&key.user_id);
        }

        tracing::debug!(
            "Typing expired: user={}, conversation={}",
            key.user_id,
            key.conversation_id
        );
        let now = Timestamp::new(self.clock.now_millis());
        self.dispatcher.to_room(
            &key.conversation_id,
            &ServerEvent::typing(
                key.user_id.clone(),
                key.conversation_id.clone(),
                now,
                false,
            ),
        );
        self.dispatcher.to_room(
            &key.conversation_id,
            &ServerEvent::ChatStateSync(table.snapshot(&key.conversation_id)),
        );
    }
}

#[cfg(test)]
mod tests {
    use huddle_shared::time::FixedClock;

    use super::*;
    use crate::{domain::ConnectionId, infrastructure::dispatcher::RecordingDispatcher};

    struct Fixture {
        tracker: TypingTracker,
        store: Arc<RoomStateStore>,
        dispatcher: Arc<RecordingDispatcher>,
        observer: ConnectionId,
        alice: UserId,
        conversation: ConversationId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(RoomStateStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let clock = Arc::new(FixedClock::new(1_000));
        let tracker = TypingTracker::new(
            store.clone(),
            dispatcher.clone(),
            clock,
            DEFAULT_TYPING_TIMEOUT,
        );

        let conversation = ConversationId::new("c1".to_string()).unwrap();
        let observer = ConnectionId::generate();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        dispatcher.register(observer, UserId::new("bob".to_string()).unwrap(), tx);
        dispatcher.subscribe(&observer, &conversation);

        Fixture {
            tracker,
            store,
            dispatcher,
            observer,
            alice: UserId::new("alice".to_string()).unwrap(),
            conversation,
        }
    }

    fn typing_flags(dispatcher: &RecordingDispatcher, observer: &ConnectionId) -> Vec<bool> {
        dispatcher
            .events_for(observer)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::UserTyping(t) => Some(t.is_typing),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_expires_after_timeout() {
        // テスト項目: 入力中のまま放置するとタイムアウトで自動的に解除される
        // given (前提条件):
        let f = fixture();
        f.tracker.set_typing(&f.alice, &f.conversation, true).await;

        // when (操作):
        tokio::time::sleep(DEFAULT_TYPING_TIMEOUT + Duration::from_millis(10)).await;

        // then (期待する結果):
        assert!(!f.store.is_typing(&f.conversation, &f.alice).await);
        assert_eq!(typing_flags(&f.dispatcher, &f.observer), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_restarts_the_window() {
        // テスト項目: 入力中の再通知でタイマーがリセットされ、期限切れは一度だけ
        // given (前提条件):
        let f = fixture();
        f.tracker.set_typing(&f.alice, &f.conversation, true).await;
        tokio::time::sleep(Duration::from_millis(3000)).await;

        // when (操作):
        f.tracker.set_typing(&f.alice, &f.conversation, true).await;
        tokio::time::sleep(Duration::from_millis(3000)).await;

        // then (期待する結果): 最初のタイマー期限 (5000ms) を過ぎても入力中のまま
        assert!(f.store.is_typing(&f.conversation, &f.alice).await);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(!f.store.is_typing(&f.conversation, &f.alice).await);
        assert_eq!(
            typing_flags(&f.dispatcher, &f.observer),
            vec![true, true, false]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_cancels_timer() {
        // テスト項目: 明示的な停止の後、キャンセル済みタイマーは何も発行しない
        // given (前提条件):
        let f = fixture();
        f.tracker.set_typing(&f.alice, &f.conversation, true).await;

        // when (操作):
        f.tracker.set_typing(&f.alice, &f.conversation, false).await;
        tokio::time::sleep(DEFAULT_TYPING_TIMEOUT * 2).await;

        // then (期待する結果):
        assert_eq!(typing_flags(&f.dispatcher, &f.observer), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_send_is_silent_when_idle() {
        // テスト項目: 入力中でないユーザーの送信前クリアはイベントを発行しない
        // given (前提条件):
        let f = fixture();

        // when (操作):
        f.tracker.stop_before_send(&f.alice, &f.conversation).await;

        // then (期待する結果):
        assert!(f.dispatcher.events_for(&f.observer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_follows_every_change() {
        // テスト項目: 入力状態の変更ごとにスナップショットが配信される
        // given (前提条件):
        let f = fixture();

        // when (操作):
        f.tracker.set_typing(&f.alice, &f.conversation, true).await;

        // then (期待する結果):
        let events = f.dispatcher.events_for(&f.observer);
        assert_eq!(events.len(), 2);
        match &events[1] {
            ServerEvent::ChatStateSync(snapshot) => {
                assert_eq!(snapshot.typing_users.len(), 1);
                assert_eq!(snapshot.typing_users[0].user_id, f.alice);
                assert_eq!(snapshot.typing_users[0].started_at, Timestamp::new(1_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_after_stop_clears_late_typing() {
        // テスト項目: 送信前クリアの後に再び入力中になっても、配信と同時に解除される
        // given (前提条件):
        let f = fixture();
        f.tracker.stop_before_send(&f.alice, &f.conversation).await;
        f.tracker.set_typing(&f.alice, &f.conversation, true).await;
        f.dispatcher.clear();

        // when (操作):
        f.tracker
            .publish_after_stop(
                &f.alice,
                &f.conversation,
                &ServerEvent::error("marker", "delivered"),
            )
            .await;

        // then (期待する結果):
        assert!(!f.store.is_typing(&f.conversation, &f.alice).await);
        let events = f.dispatcher.events_for(&f.observer);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ServerEvent::UserTyping(t) if !t.is_typing));
        assert!(matches!(&events[1], ServerEvent::ChatStateSync(s) if s.typing_users.is_empty()));
        assert!(matches!(&events[2], ServerEvent::Error(_)));

        tokio::time::sleep(DEFAULT_TYPING_TIMEOUT * 2).await;
        assert_eq!(f.dispatcher.events_for(&f.observer).len(), 3);
    }
}
