//! Connection / room / user routing table.

use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::domain::{ConnectionId, ConversationId, UserId};

/// Who receives what.
///
/// Rooms and user channels are derived from registrations and subscriptions;
/// empty rooms and user entries are removed eagerly.
#[derive(Debug, Default)]
pub struct RoutingTable {
    /// connection -> owning user
    connections: DashMap<ConnectionId, UserId>,
    /// connection -> rooms it is subscribed to
    subscriptions: DashMap<ConnectionId, DashSet<ConversationId>>,
    /// room -> subscribed connections
    rooms: DashMap<ConversationId, DashSet<ConnectionId>>,
    /// user -> live connections
    users: DashMap<UserId, DashSet<ConnectionId>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: ConnectionId, user_id: UserId) {
        self.users
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id);
        self.connections.insert(connection_id, user_id);
        self.subscriptions.entry(connection_id).or_default();
    }

    /// Remove a connection and every subscription it held.
    ///
    /// Returns `false` if the connection was not registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, user_id)) = self.connections.remove(connection_id) else {
            return false;
        };

        if let Some((_, rooms)) = self.subscriptions.remove(connection_id) {
            for conversation_id in rooms.iter() {
                self.remove_from_room(connection_id, &conversation_id);
            }
        }

        if let Some(connections) = self.users.get(&user_id) {
            connections.remove(connection_id);
        }
        self.users.remove_if(&user_id, |_, connections| connections.is_empty());

        debug!(connection = %connection_id, user = %user_id, "Connection unregistered");
        true
    }

    /// Returns `false` if the connection is unknown or already subscribed
    pub fn subscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) -> bool {
        let Some(rooms) = self.subscriptions.get(connection_id) else {
            return false;
        };
        if !rooms.insert(conversation_id.clone()) {
            return false;
        }
        drop(rooms);

        self.rooms
            .entry(conversation_id.clone())
            .or_default()
            .insert(*connection_id);
        debug!(connection = %connection_id, room = %conversation_id, "Subscribed");
        true
    }

    pub fn unsubscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) -> bool {
        let removed = self
            .subscriptions
            .get(connection_id)
            .and_then(|rooms| rooms.remove(conversation_id))
            .is_some();
        if removed {
            self.remove_from_room(connection_id, conversation_id);
            debug!(connection = %connection_id, room = %conversation_id, "Unsubscribed");
        }
        removed
    }

    fn remove_from_room(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) {
        if let Some(members) = self.rooms.get(conversation_id) {
            members.remove(connection_id);
        }
        self.rooms
            .remove_if(conversation_id, |_, members| members.is_empty());
    }

    pub fn is_subscribed(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) -> bool {
        self.subscriptions
            .get(connection_id)
            .is_some_and(|rooms| rooms.contains(conversation_id))
    }

    pub fn room_members(&self, conversation_id: &ConversationId) -> Vec<ConnectionId> {
        self.rooms
            .get(conversation_id)
            .map(|members| members.iter().map(|c| *c).collect())
            .unwrap_or_default()
    }

    pub fn user_connections(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.users
            .get(user_id)
            .map(|connections| connections.iter().map(|c| *c).collect())
            .unwrap_or_default()
    }

    pub fn all_connections(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
