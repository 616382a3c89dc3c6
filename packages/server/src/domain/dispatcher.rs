//! Broadcast dispatcher interface.
//!
//! Abstracts the transport's room/group primitive. Every method returns
//! immediately; delivery is best effort and failures to reach a vanished
//! subscriber are dropped.

use tokio::sync::mpsc;

use super::{ConnectionId, ConversationId, ServerEvent, UserId};

/// Outbound channel of one connection (serialized frames)
pub type PusherChannel = mpsc::UnboundedSender<String>;

pub trait BroadcastDispatcher: Send + Sync {
    /// Start routing events to a new connection
    fn register(&self, connection_id: ConnectionId, user_id: UserId, channel: PusherChannel);

    /// Stop routing events to a connection and drop all of its subscriptions
    fn unregister(&self, connection_id: &ConnectionId);

    /// Subscribe a connection to a conversation room (idempotent)
    fn subscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId);

    fn unsubscribe(&self, connection_id: &ConnectionId, conversation_id: &ConversationId);

    fn to_connection(&self, connection_id: &ConnectionId, event: &ServerEvent);

    fn to_room(&self, conversation_id: &ConversationId, event: &ServerEvent);

    fn to_room_except(
        &self,
        conversation_id: &ConversationId,
        except: &ConnectionId,
        event: &ServerEvent,
    );

    /// Every live connection of a user
    fn to_user(&self, user_id: &UserId, event: &ServerEvent);

    fn broadcast_global(&self, event: &ServerEvent);
}
