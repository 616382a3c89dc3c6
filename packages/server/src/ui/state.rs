//! Shared application state and its wiring.

use std::sync::Arc;

use huddle_shared::time::Clock;

use crate::{
    config::Config,
    domain::BroadcastDispatcher,
    infrastructure::{
        auth::JwtCredentialVerifier, dispatcher::WebSocketDispatcher, repository::InMemoryStore,
    },
    usecase::{
        ConnectionManager, ConversationService, Directory, MessagePipeline,
        ReadReceiptSynchronizer, RoomStateStore, TypingTracker,
    },
};

/// Shared application state
pub struct AppState {
    /// 接続・ルーム参加・入力中の管理
    pub connection_manager: Arc<ConnectionManager>,
    /// メッセージ送信
    pub message_pipeline: Arc<MessagePipeline>,
    /// 既読の同期
    pub read_receipts: Arc<ReadReceiptSynchronizer>,
    /// 会話と参加者の管理
    pub conversations: Arc<ConversationService>,
    /// ルーム状態（デバッグ用の参照）
    pub room_state: Arc<RoomStateStore>,
}

impl AppState {
    /// Wire every use case over an in-memory store and a WebSocket dispatcher
    pub fn in_memory(config: &Config, store: InMemoryStore, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(store);
        let dispatcher: Arc<dyn BroadcastDispatcher> = Arc::new(WebSocketDispatcher::new());
        let room_state = Arc::new(RoomStateStore::new());
        let verifier = Arc::new(JwtCredentialVerifier::new(
            &config.jwt_secret,
            store.clone(),
        ));

        let typing = TypingTracker::new(
            room_state.clone(),
            dispatcher.clone(),
            clock.clone(),
            config.typing_timeout,
        );
        let directory = Directory {
            users: store.clone(),
            memberships: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
        };
        let connection_manager = Arc::new(ConnectionManager::new(
            verifier,
            directory.clone(),
            room_state.clone(),
            typing.clone(),
            dispatcher.clone(),
            clock.clone(),
            config.history_limit,
        ));
        let message_pipeline = Arc::new(MessagePipeline::new(
            store.clone(),
            store.clone(),
            typing,
            clock.clone(),
        ));
        let read_receipts = Arc::new(ReadReceiptSynchronizer::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let conversations = Arc::new(ConversationService::new(
            store,
            directory,
            connection_manager.clone(),
            dispatcher,
            clock,
        ));

        Self {
            connection_manager,
            message_pipeline,
            read_receipts,
            conversations,
            room_state,
        }
    }
}
