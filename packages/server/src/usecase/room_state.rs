//! Room State Store: the single owner of all ephemeral coordination state.
//!
//! Rooms (online users + typing entries), live sessions and typing timers sit
//! behind one async mutex. Every read-modify-write, including the snapshot
//! published after it, happens while that lock is held, so concurrent joins,
//! leaves and timer expiries on the same room never interleave.

use std::collections::{HashMap, HashSet};

use tokio::{
    sync::{Mutex, MutexGuard},
    task::AbortHandle,
};

use crate::domain::{
    ConnectionId, ConversationId, RoomSnapshot, RoomState, TypingEntry, TypingKey, UserId,
};

/// Ownership link between one live connection and one verified user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    /// Conversations this connection has joined
    pub joined: HashSet<ConversationId>,
}

impl Session {
    pub fn new(connection_id: ConnectionId, user_id: UserId) -> Self {
        Self {
            connection_id,
            user_id,
            joined: HashSet::new(),
        }
    }
}

/// Cheap handle identifying a session, held by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

#[derive(Debug)]
struct TypingTimer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
pub struct PresenceTable {
    rooms: HashMap<ConversationId, RoomState>,
    sessions: HashMap<ConnectionId, Session>,
    timers: HashMap<TypingKey, TypingTimer>,
    next_generation: u64,
}

impl PresenceTable {
    /// Room state, created on first reference
    pub fn room_mut(&mut self, conversation_id: &ConversationId) -> &mut RoomState {
        self.rooms.entry(conversation_id.clone()).or_default()
    }

    pub fn room_mut_if_exists(&mut self, conversation_id: &ConversationId) -> Option<&mut RoomState> {
        self.rooms.get_mut(conversation_id)
    }

    pub fn room(&self, conversation_id: &ConversationId) -> Option<&RoomState> {
        self.rooms.get(conversation_id)
    }

    pub fn snapshot(&self, conversation_id: &ConversationId) -> RoomSnapshot {
        match self.rooms.get(conversation_id) {
            Some(room) => room.snapshot(conversation_id),
            None => RoomState::new().snapshot(conversation_id),
        }
    }

    pub fn open_session(&mut self, session: Session) {
        self.sessions.insert(session.connection_id, session);
    }

    pub fn close_session(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        self.sessions.remove(connection_id)
    }

    pub fn session(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn session_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(connection_id)
    }

    /// Connections of `user_id` that have joined `conversation_id`, sorted
    pub fn joined_connections(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| &s.user_id == user_id && s.joined.contains(conversation_id))
            .map(|s| s.connection_id)
            .collect();
        connections.sort();
        connections
    }

    /// Whether the user still has any live session
    pub fn has_session_for(&self, user_id: &UserId) -> bool {
        self.sessions.values().any(|s| &s.user_id == user_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Reserve the generation number for a timer about to be installed
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Record the timer for `key`. Any previous timer must be cancelled first.
    pub fn install_timer(&mut self, key: TypingKey, generation: u64, handle: AbortHandle) {
        if let Some(stale) = self.timers.insert(key, TypingTimer { generation, handle }) {
            stale.handle.abort();
        }
    }

    /// Abort and forget the timer for `key`
    pub fn cancel_timer(&mut self, key: &TypingKey) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claim the timer for `key` on behalf of the firing task.
    ///
    /// Succeeds only if the timer is still the one with `generation`; a timer
    /// that was cancelled or replaced gets `false` and must do nothing.
    pub fn claim_expired_timer(&mut self, key: &TypingKey, generation: u64) -> bool {
        match self.timers.get(key) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn has_timer(&self, key: &TypingKey) -> bool {
        self.timers.contains_key(key)
    }

    /// Cancel the timer and remove the typing entry together
    pub fn clear_typing(&mut self, key: &TypingKey) -> Option<TypingEntry> {
        self.cancel_timer(key);
        self.rooms
            .get_mut(&key.conversation_id)
            .and_then(|room| room.clear_typing(&key.user_id))
    }
}

#[derive(Debug, Default)]
pub struct RoomStateStore {
    table: Mutex<PresenceTable>,
}

impl RoomStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the whole table for an atomic read-modify-write
    pub async fn lock(&self) -> MutexGuard<'_, PresenceTable> {
        self.table.lock().await
    }

    pub async fn snapshot(&self, conversation_id: &ConversationId) -> RoomSnapshot {
        self.table.lock().await.snapshot(conversation_id)
    }

    pub async fn is_online(&self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        self.table
            .lock()
            .await
            .room(conversation_id)
            .is_some_and(|room| room.is_online(user_id))
    }

    pub async fn is_typing(&self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        self.table
            .lock()
            .await
            .room(conversation_id)
            .is_some_and(|room| room.typing_entry(user_id).is_some())
    }

    pub async fn session_count(&self) -> usize {
        self.table.lock().await.session_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TypingKey {
        TypingKey::new(
            UserId::new("alice".to_string()).unwrap(),
            ConversationId::new("c1".to_string()).unwrap(),
        )
    }

    fn idle_handle() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[tokio::test]
    async fn test_claim_rejects_replaced_timer() {
        // テスト項目: 置き換えられた古いタイマーは期限切れ処理を取得できない
        // given (前提条件):
        let store = RoomStateStore::new();
        let mut table = store.lock().await;
        let first = table.next_generation();
        table.install_timer(key(), first, idle_handle());
        let second = table.next_generation();
        table.cancel_timer(&key());
        table.install_timer(key(), second, idle_handle());

        // when (操作):
        let stale_claim = table.claim_expired_timer(&key(), first);
        let live_claim = table.claim_expired_timer(&key(), second);

        // then (期待する結果):
        assert!(!stale_claim);
        assert!(live_claim);
        assert!(!table.has_timer(&key()));
    }

    #[tokio::test]
    async fn test_claim_after_cancel_is_noop() {
        // テスト項目: キャンセル後に発火したタイマーは何もしない
        // given (前提条件):
        let store = RoomStateStore::new();
        let mut table = store.lock().await;
        let generation = table.next_generation();
        table.install_timer(key(), generation, idle_handle());

        // when (操作):
        table.cancel_timer(&key());
        let claimed = table.claim_expired_timer(&key(), generation);

        // then (期待する結果):
        assert!(!claimed);
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_room_is_empty() {
        // テスト項目: 未知のルームのスナップショットは空で、ルームは作られない
        // given (前提条件):
        let store = RoomStateStore::new();
        let conversation = ConversationId::new("nowhere".to_string()).unwrap();

        // when (操作):
        let snapshot = store.snapshot(&conversation).await;

        // then (期待する結果):
        assert!(snapshot.online_users.is_empty());
        assert!(snapshot.typing_users.is_empty());
        assert!(store.lock().await.room(&conversation).is_none());
    }
}
