//! UseCase: connection lifecycle and room membership.
//!
//! Owns the session <-> room bookkeeping: what happens when a socket is
//! authenticated, opened, joins or leaves a room, reports typing, and closes.
//! All room mutations and the snapshots they publish happen under the
//! [`RoomStateStore`] lock.

use std::sync::Arc;

use huddle_shared::time::Clock;

use crate::domain::{
    BroadcastDispatcher, ConnectionId, ConversationId, ConversationRepository,
    CredentialVerifier, MessageRepository, ParticipantRepository, PusherChannel, ServerEvent,
    Timestamp, UserId, UserRepository,
    event::{ChatHistory, NewMessage, RoomMembership, UserStatus},
};

use super::{
    error::{ChatError, ConnectError},
    message_pipeline::attach_senders,
    room_state::{RoomStateStore, Session, SessionHandle},
    typing::TypingTracker,
};

/// Default number of messages sent as history on join
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Read-side repositories the connection manager needs
#[derive(Clone)]
pub struct Directory {
    pub users: Arc<dyn UserRepository>,
    pub memberships: Arc<dyn ParticipantRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

pub struct ConnectionManager {
    verifier: Arc<dyn CredentialVerifier>,
    directory: Directory,
    store: Arc<RoomStateStore>,
    typing: TypingTracker,
    dispatcher: Arc<dyn BroadcastDispatcher>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
}

impl ConnectionManager {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        directory: Directory,
        store: Arc<RoomStateStore>,
        typing: TypingTracker,
        dispatcher: Arc<dyn BroadcastDispatcher>,
        clock: Arc<dyn Clock>,
        history_limit: usize,
    ) -> Self {
        Self {
            verifier,
            directory,
            store,
            typing,
            dispatcher,
            clock,
            history_limit,
        }
    }

    /// Verify the handshake credential
    pub async fn authenticate(&self, token: &str) -> Result<UserId, ConnectError> {
        let user_id = self.verifier.verify(token).await?;
        tracing::debug!("Authenticated user {}", user_id);
        Ok(user_id)
    }

    /// Open a session for a verified user.
    ///
    /// Subscribes the connection to every conversation the user belongs to,
    /// marks the user online in each and broadcasts `userStatus` online.
    pub async fn connect(
        &self,
        user_id: UserId,
        channel: PusherChannel,
    ) -> Result<SessionHandle, ConnectError> {
        let memberships = self
            .directory
            .memberships
            .list_by_user(&user_id)
            .await
            .map_err(|e| ConnectError::MembershipUnavailable(e.to_string()))?;

        let connection_id = ConnectionId::generate();
        self.dispatcher
            .register(connection_id, user_id.clone(), channel);

        {
            let mut table = self.store.lock().await;
            let mut session = Session::new(connection_id, user_id.clone());
            for membership in &memberships {
                let conversation_id = &membership.conversation_id;
                self.dispatcher.subscribe(&connection_id, conversation_id);
                table.room_mut(conversation_id).join(&user_id, connection_id);
                session.joined.insert(conversation_id.clone());
                self.dispatcher.to_room(
                    conversation_id,
                    &ServerEvent::ChatStateSync(table.snapshot(conversation_id)),
                );
            }
            table.open_session(session);
            self.dispatcher.broadcast_global(&ServerEvent::UserStatus(UserStatus {
                user_id: user_id.clone(),
                is_online: true,
            }));
        }

        tracing::info!(
            "User {} connected as {} ({} conversation(s))",
            user_id,
            connection_id,
            memberships.len()
        );

        Ok(SessionHandle {
            connection_id,
            user_id,
        })
    }

    /// Tear a session down. Safe to call for a session that is already gone.
    ///
    /// `userStatus` offline is broadcast only when this was the user's last
    /// live connection. Both status broadcasts go out under the table lock, so
    /// the last one observed always matches the session table.
    pub async fn disconnect(&self, handle: &SessionHandle) {
        let now = Timestamp::new(self.clock.now_millis());
        if let Err(e) = self
            .directory
            .users
            .update_last_seen(&handle.user_id, now)
            .await
        {
            tracing::warn!("Failed to update last seen of {}: {}", handle.user_id, e);
        }

        {
            let mut table = self.store.lock().await;
            let Some(session) = table.close_session(&handle.connection_id) else {
                return;
            };
            let mut rooms: Vec<&ConversationId> = session.joined.iter().collect();
            rooms.sort();
            for conversation_id in rooms {
                self.dispatcher
                    .unsubscribe(&handle.connection_id, conversation_id);
                table
                    .room_mut(conversation_id)
                    .leave(&handle.user_id, &handle.connection_id);
                self.typing
                    .stop_locked(&mut table, &handle.user_id, conversation_id, true);
                self.dispatcher.to_room(
                    conversation_id,
                    &ServerEvent::ChatStateSync(table.snapshot(conversation_id)),
                );
            }
            self.dispatcher.unregister(&handle.connection_id);
            if !table.has_session_for(&handle.user_id) {
                self.dispatcher.broadcast_global(&ServerEvent::UserStatus(UserStatus {
                    user_id: handle.user_id.clone(),
                    is_online: false,
                }));
            }
        }

        tracing::info!(
            "User {} disconnected ({})",
            handle.user_id,
            handle.connection_id
        );
    }

    /// Join a conversation room and receive its recent history.
    ///
    /// Re-joining is allowed and sends history again, but other subscribers
    /// are told about the join only once.
    pub async fn join_chat(
        &self,
        handle: &SessionHandle,
        conversation_id: &str,
    ) -> Result<(), ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;
        self.ensure_member(&conversation_id, &handle.user_id).await?;

        let messages = self
            .directory
            .messages
            .find_by_conversation(&conversation_id, self.history_limit)
            .await?;
        let history = attach_senders(self.directory.users.as_ref(), messages).await?;

        let mut table = self.store.lock().await;
        let session = table
            .session_mut(&handle.connection_id)
            .ok_or(ChatError::SessionClosed)?;
        let newly_joined = session.joined.insert(conversation_id.clone());

        self.dispatcher
            .subscribe(&handle.connection_id, &conversation_id);
        table
            .room_mut(&conversation_id)
            .join(&handle.user_id, handle.connection_id);
        self.dispatcher.to_room(
            &conversation_id,
            &ServerEvent::ChatStateSync(table.snapshot(&conversation_id)),
        );
        self.dispatcher.to_connection(
            &handle.connection_id,
            &ServerEvent::ChatHistory(ChatHistory {
                conversation_id: conversation_id.clone(),
                messages: history,
            }),
        );
        if newly_joined {
            self.dispatcher.to_room_except(
                &conversation_id,
                &handle.connection_id,
                &ServerEvent::UserJoinedChat(RoomMembership {
                    user_id: handle.user_id.clone(),
                    conversation_id: conversation_id.clone(),
                }),
            );
        }
        tracing::debug!("User {} joined chat {}", handle.user_id, conversation_id);
        Ok(())
    }

    /// Leave a conversation room. Leaving a room never joined is a no-op.
    pub async fn leave_chat(
        &self,
        handle: &SessionHandle,
        conversation_id: &str,
    ) -> Result<(), ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;

        let mut table = self.store.lock().await;
        let session = table
            .session_mut(&handle.connection_id)
            .ok_or(ChatError::SessionClosed)?;
        if !session.joined.remove(&conversation_id) {
            return Ok(());
        }

        self.dispatcher
            .unsubscribe(&handle.connection_id, &conversation_id);
        table
            .room_mut(&conversation_id)
            .leave(&handle.user_id, &handle.connection_id);
        self.typing
            .stop_locked(&mut table, &handle.user_id, &conversation_id, true);
        self.dispatcher.to_room(
            &conversation_id,
            &ServerEvent::ChatStateSync(table.snapshot(&conversation_id)),
        );
        self.dispatcher.to_room(
            &conversation_id,
            &ServerEvent::UserLeftChat(RoomMembership {
                user_id: handle.user_id.clone(),
                conversation_id: conversation_id.clone(),
            }),
        );
        tracing::debug!("User {} left chat {}", handle.user_id, conversation_id);
        Ok(())
    }

    /// Pull every live connection of `user_id` out of a conversation room.
    ///
    /// Called after the membership itself is gone. Remaining subscribers get
    /// `userLeftChat` and, if a connection was evicted, a fresh snapshot.
    pub async fn evict_user(&self, user_id: &UserId, conversation_id: &ConversationId) {
        let mut table = self.store.lock().await;
        let connections = table.joined_connections(user_id, conversation_id);
        for connection_id in &connections {
            if let Some(session) = table.session_mut(connection_id) {
                session.joined.remove(conversation_id);
            }
            self.dispatcher.unsubscribe(connection_id, conversation_id);
            table.room_mut(conversation_id).leave(user_id, connection_id);
        }
        if !connections.is_empty() {
            self.typing
                .stop_locked(&mut table, user_id, conversation_id, true);
            self.dispatcher.to_room(
                conversation_id,
                &ServerEvent::ChatStateSync(table.snapshot(conversation_id)),
            );
        }
        self.dispatcher.to_room(
            conversation_id,
            &ServerEvent::UserLeftChat(RoomMembership {
                user_id: user_id.clone(),
                conversation_id: conversation_id.clone(),
            }),
        );
        tracing::debug!(
            "User {} evicted from chat {} ({} connection(s))",
            user_id,
            conversation_id,
            connections.len()
        );
    }

    /// Report typing activity in a room this connection has joined
    pub async fn typing(
        &self,
        handle: &SessionHandle,
        conversation_id: &str,
        is_typing: bool,
    ) -> Result<(), ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;

        let mut table = self.store.lock().await;
        let session = table
            .session(&handle.connection_id)
            .ok_or(ChatError::SessionClosed)?;
        if !session.joined.contains(&conversation_id) {
            return Err(ChatError::Validation(format!(
                "conversation '{}' has not been joined",
                conversation_id
            )));
        }
        self.typing
            .apply_locked(&mut table, &handle.user_id, &conversation_id, is_typing);
        Ok(())
    }

    /// Send a scoped `error` event to the connection that caused `error`
    pub fn report_error(&self, handle: &SessionHandle, action: &str, error: &ChatError) {
        tracing::warn!(
            "{} for user {} ({}): {}",
            action,
            handle.user_id,
            handle.connection_id,
            error
        );
        self.dispatcher.to_connection(
            &handle.connection_id,
            &ServerEvent::error(action, error.to_string()),
        );
    }

    /// Acknowledge a failed send to the sender only
    pub fn report_send_failure(&self, handle: &SessionHandle, error: &ChatError) {
        tracing::warn!(
            "Failed to send message for user {} ({}): {}",
            handle.user_id,
            handle.connection_id,
            error
        );
        self.dispatcher.to_connection(
            &handle.connection_id,
            &ServerEvent::NewMessage(NewMessage {
                success: false,
                message: None,
                error: Some(error.to_string()),
            }),
        );
    }

    async fn ensure_member(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<(), ChatError> {
        if self
            .directory
            .conversations
            .find_conversation(conversation_id)
            .await?
            .is_none()
        {
            return Err(ChatError::NotFound(format!(
                "conversation '{}'",
                conversation_id
            )));
        }
        if self
            .directory
            .memberships
            .find_participant(conversation_id, user_id)
            .await?
            .is_none()
        {
            return Err(ChatError::NotFound(format!(
                "participant '{}' in conversation '{}'",
                user_id, conversation_id
            )));
        }
        Ok(())
    }
}
