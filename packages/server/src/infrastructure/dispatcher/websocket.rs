//! WebSocket を使った BroadcastDispatcher 実装
//!
//! The UI layer creates the per-connection channel when it accepts a socket
//! and hands the sender over through [`BroadcastDispatcher::register`]. This
//! dispatcher only serializes events and pushes frames into those channels.

use dashmap::DashMap;

use crate::domain::{
    BroadcastDispatcher, ConnectionId, ConversationId, PusherChannel, ServerEvent, UserId,
};

use super::RoutingTable;

#[derive(Debug, Default)]
pub struct WebSocketDispatcher {
    routes: RoutingTable,
    channels: DashMap<ConnectionId, PusherChannel>,
}

impl WebSocketDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    fn encode(event: &ServerEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!("Failed to serialize '{}' event: {}", event.name(), e);
                None
            }
        }
    }

    fn deliver(&self, targets: impl IntoIterator<Item = ConnectionId>, event: &ServerEvent) {
        let Some(frame) = Self::encode(event) else {
            return;
        };
        for target in targets {
            match self.channels.get(&target) {
                Some(sender) => {
                    // A closed receiver means the socket is going away; drop the frame
                    if sender.send(frame.clone()).is_err() {
                        tracing::debug!(
                            "Dropped '{}' for closing connection {}",
                            event.name(),
                            target
                        );
                    }
                }
                None => {
                    tracing::debug!(
                        "Connection {} not found while delivering '{}', skipping",
                        target,
                        event.name()
                    );
                }
            }
        }
    }
}

impl BroadcastDispatcher for WebSocketDispatcher {
    fn register(&self, connection_id: ConnectionId, user_id: UserId, channel: PusherChannel) {
        self.channels.insert(connection_id, channel);
        self.routes.register(connection_id, user_id);
        tracing::debug!("Connection {} registered to dispatcher", connection_id);
    }

    fn unregister(&self, connection_id: &ConnectionId) {
        self.routes.unregister(connection_id);
        self.channels.remove(connection_id);
    }

    fn subscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) {
        self.routes.subscribe(connection_id, conversation_id);
    }

    fn unsubscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) {
        self.routes.unsubscribe(connection_id, conversation_id);
    }

    fn to_connection(&self, connection_id: &ConnectionId, event: &ServerEvent) {
        self.deliver([*connection_id], event);
    }

    fn to_room(&self, conversation_id: &ConversationId, event: &ServerEvent) {
        self.deliver(self.routes.room_members(conversation_id), event);
    }

    fn to_room_except(
        &self,
        conversation_id: &ConversationId,
        except: &ConnectionId,
        event: &ServerEvent,
    ) {
        let targets = self
            .routes
            .room_members(conversation_id)
            .into_iter()
            .filter(|c| c != except);
        self.deliver(targets, event);
    }

    fn to_user(&self, user_id: &UserId, event: &ServerEvent) {
        self.deliver(self.routes.user_connections(user_id), event);
    }

    fn broadcast_global(&self, event: &ServerEvent) {
        self.deliver(self.routes.all_connections(), event);
    }
}
