//! BroadcastDispatcher that records every delivery instead of sending it.
//!
//! Routing is identical to [`super::WebSocketDispatcher`], so assertions made
//! against recorded deliveries describe what real clients would receive.

use std::sync::{Mutex, PoisonError};

use crate::domain::{
    BroadcastDispatcher, ConnectionId, ConversationId, PusherChannel, ServerEvent, UserId,
};

use super::RoutingTable;

/// One event delivered to one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub connection_id: ConnectionId,
    pub event: ServerEvent,
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    routes: RoutingTable,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// All deliveries so far, in emission order
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events received by one connection, in order
    pub fn events_for(&self, connection_id: &ConnectionId) -> Vec<ServerEvent> {
        self.deliveries()
            .into_iter()
            .filter(|d| &d.connection_id == connection_id)
            .map(|d| d.event)
            .collect()
    }

    pub fn clear(&self) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, targets: impl IntoIterator<Item = ConnectionId>, event: &ServerEvent) {
        let mut deliveries = self
            .deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut targets: Vec<ConnectionId> = targets.into_iter().collect();
        targets.sort();
        for connection_id in targets {
            deliveries.push(Delivery {
                connection_id,
                event: event.clone(),
            });
        }
    }
}

impl BroadcastDispatcher for RecordingDispatcher {
    fn register(&self, connection_id: ConnectionId, user_id: UserId, _channel: PusherChannel) {
        self.routes.register(connection_id, user_id);
    }

    fn unregister(&self, connection_id: &ConnectionId) {
        self.routes.unregister(connection_id);
    }

    fn subscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) {
        self.routes.subscribe(connection_id, conversation_id);
    }

    fn unsubscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) {
        self.routes.unsubscribe(connection_id, conversation_id);
    }

    fn to_connection(&self, connection_id: &ConnectionId, event: &ServerEvent) {
        self.record([*connection_id], event);
    }

    fn to_room(&self, conversation_id: &ConversationId, event: &ServerEvent) {
        self.record(self.routes.room_members(conversation_id), event);
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
        self.record(targets, event);
    }

    fn to_user(&self, user_id: &UserId, event: &ServerEvent) {
        self.record(self.routes.user_connections(user_id), event);
    }

    fn broadcast_global(&self, event: &ServerEvent) {
        self.record(self.routes.all_connections(), event);
    }
}
