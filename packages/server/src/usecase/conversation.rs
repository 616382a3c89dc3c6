//! UseCase: conversation and participant management.
//!
//! Every write runs in one transaction. Users affected by a membership
//! change are told on all of their live connections after the commit, and a
//! removed user is pulled out of the live room as well.
//!
//! Reads are limited to participants of the conversation being read.

use std::{collections::HashSet, sync::Arc};

use huddle_shared::time::Clock;

use crate::domain::{
    BroadcastDispatcher, Conversation, ConversationId, ConversationKind, MessageId,
    MessageView, Participant, ParticipantRole, ServerEvent, Timestamp, Transaction,
    TransactionManager, UserId, event::RoomMembership,
};

use super::{
    connection::{ConnectionManager, Directory},
    error::ChatError,
    message_pipeline::attach_senders,
};

/// Largest history page a single read may ask for
pub const MAX_HISTORY_PAGE: usize = 500;

/// Request to open a new conversation
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub kind: ConversationKind,
    pub name: Option<String>,
    /// Raw user ids; the creator is added if missing
    pub participant_ids: Vec<String>,
}

pub struct ConversationService {
    transactions: Arc<dyn TransactionManager>,
    directory: Directory,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<dyn BroadcastDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ConversationService {
    pub fn new(
        transactions: Arc<dyn TransactionManager>,
        directory: Directory,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<dyn BroadcastDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions,
            directory,
            connections,
            dispatcher,
            clock,
        }
    }

    /// Create a conversation with its participants.
    ///
    /// A DIRECT conversation has exactly two distinct participants. In a
    /// GROUP the creator becomes admin.
    pub async fn create_conversation(
        &self,
        creator: &UserId,
        request: NewConversation,
    ) -> Result<Conversation, ChatError> {
        let mut members = vec![creator.clone()];
        for raw in request.participant_ids {
            let id = UserId::new(raw)?;
            if !members.contains(&id) {
                members.push(id);
            }
        }
        if request.kind == ConversationKind::Direct && members.len() != 2 {
            return Err(ChatError::Validation(format!(
                "a direct conversation needs exactly 2 participants, got {}",
                members.len()
            )));
        }
        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.ensure_users_exist(&members).await?;

        let now = Timestamp::new(self.clock.now_millis());
        let mut conversation = Conversation::new(
            ConversationId::generate(),
            request.kind,
            name,
            Some(creator.clone()),
            now,
        );
        for member in &members {
            conversation.add_participant_ref(member.clone());
        }

        let mut tx = self.transactions.begin().await?;
        let staged = async {
            tx.save_conversation(conversation.clone()).await?;
            for member in &members {
                let role = if request.kind == ConversationKind::Group && member == creator {
                    ParticipantRole::Admin
                } else {
                    ParticipantRole::Member
                };
                tx.save_participant(Participant::new(
                    member.clone(),
                    conversation.id.clone(),
                    role,
                    now,
                ))
                .await?;
            }
            Ok::<_, ChatError>(())
        }
        .await;
        finish(tx, staged).await?;

        tracing::info!(
            "Conversation {} created by {} with {} participant(s)",
            conversation.id,
            creator,
            members.len()
        );
        for member in &members {
            self.notify_joined(member, &conversation.id);
        }
        Ok(conversation)
    }

    /// Add users to a GROUP conversation. Existing participants are skipped.
    ///
    /// Returns the full participant list after the change.
    pub async fn add_participants(
        &self,
        actor: &UserId,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<Participant>, ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;
        let mut candidates = Vec::with_capacity(user_ids.len());
        for raw in user_ids {
            let id = UserId::new(raw.clone())?;
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }
        if candidates.is_empty() {
            return Err(ChatError::Validation("userIds must not be empty".to_string()));
        }
        self.ensure_users_exist(&candidates).await?;

        let now = Timestamp::new(self.clock.now_millis());
        let mut tx = self.transactions.begin().await?;
        let staged = add_in_tx(tx.as_mut(), actor, &conversation_id, &candidates, now).await;
        let (added, participants) = finish(tx, staged).await?;

        tracing::info!(
            "{} participant(s) added to conversation {} by {}",
            added.len(),
            conversation_id,
            actor
        );
        for user_id in &added {
            self.notify_joined(user_id, &conversation_id);
        }
        Ok(participants)
    }

    /// Remove one participant. Admins may remove anyone; others only themselves.
    ///
    /// The removed user's live connections leave the room before anyone is
    /// notified.
    pub async fn remove_participant(
        &self,
        actor: &UserId,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Vec<Participant>, ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;
        let target = UserId::new(user_id.to_string())?;

        let now = Timestamp::new(self.clock.now_millis());
        let mut tx = self.transactions.begin().await?;
        let staged = remove_in_tx(tx.as_mut(), actor, &conversation_id, &target, now).await;
        let participants = finish(tx, staged).await?;

        tracing::info!(
            "Participant {} removed from conversation {} by {}",
            target,
            conversation_id,
            actor
        );
        self.connections
            .evict_user(&target, &conversation_id)
            .await;
        self.dispatcher.to_user(
            &target,
            &ServerEvent::UserLeftChat(RoomMembership {
                user_id: target.clone(),
                conversation_id,
            }),
        );
        Ok(participants)
    }

    pub async fn list_participants(
        &self,
        viewer: &UserId,
        conversation_id: &str,
    ) -> Result<Vec<Participant>, ChatError> {
        let conversation = self.get_conversation(viewer, conversation_id).await?;
        Ok(self
            .directory
            .memberships
            .list_by_conversation(&conversation.id)
            .await?)
    }

    /// Conversations `user_id` belongs to, oldest first, optionally of one kind
    pub async fn list_conversations(
        &self,
        user_id: &UserId,
        kind: Option<ConversationKind>,
    ) -> Result<Vec<Conversation>, ChatError> {
        let memberships = self.directory.memberships.list_by_user(user_id).await?;
        let mut conversations = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let Some(conversation) = self
                .directory
                .conversations
                .find_conversation(&membership.conversation_id)
                .await?
            else {
                tracing::warn!(
                    "Membership of {} points at missing conversation {}",
                    user_id,
                    membership.conversation_id
                );
                continue;
            };
            if kind.is_none_or(|k| k == conversation.kind) {
                conversations.push(conversation);
            }
        }
        conversations.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(conversations)
    }

    /// One conversation, visible to its participants only
    pub async fn get_conversation(
        &self,
        viewer: &UserId,
        conversation_id: &str,
    ) -> Result<Conversation, ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;
        let conversation = self
            .directory
            .conversations
            .find_conversation(&conversation_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation '{}'", conversation_id)))?;
        self.ensure_participant(viewer, &conversation_id).await?;
        Ok(conversation)
    }

    /// The most recent `limit` messages, oldest first, with senders attached
    pub async fn list_messages(
        &self,
        viewer: &UserId,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageView>, ChatError> {
        if limit == 0 || limit > MAX_HISTORY_PAGE {
            return Err(ChatError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_PAGE
            )));
        }
        let conversation = self.get_conversation(viewer, conversation_id).await?;
        let messages = self
            .directory
            .messages
            .find_by_conversation(&conversation.id, limit)
            .await?;
        attach_senders(self.directory.users.as_ref(), messages).await
    }

    /// One message, visible to participants of its conversation only
    pub async fn get_message(
        &self,
        viewer: &UserId,
        message_id: &str,
    ) -> Result<MessageView, ChatError> {
        let message_id = MessageId::new(message_id.to_string())?;
        let message = self
            .directory
            .messages
            .find_message(&message_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message '{}'", message_id)))?;
        self.ensure_participant(viewer, &message.conversation_id)
            .await?;
        let mut views = attach_senders(self.directory.users.as_ref(), vec![message]).await?;
        views
            .pop()
            .ok_or_else(|| ChatError::NotFound(format!("message '{}'", message_id)))
    }

    async fn ensure_participant(
        &self,
        viewer: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<(), ChatError> {
        if self
            .directory
            .memberships
            .find_participant(conversation_id, viewer)
            .await?
            .is_none()
        {
            return Err(ChatError::Forbidden(format!(
                "'{}' is not a participant of '{}'",
                viewer, conversation_id
            )));
        }
        Ok(())
    }

    async fn ensure_users_exist(&self, user_ids: &[UserId]) -> Result<(), ChatError> {
        for user_id in user_ids {
            if self.directory.users.find_user(user_id).await?.is_none() {
                return Err(ChatError::NotFound(format!("user '{}'", user_id)));
            }
        }
        Ok(())
    }

    fn notify_joined(&self, user_id: &UserId, conversation_id: &ConversationId) {
        self.dispatcher.to_user(
            user_id,
            &ServerEvent::UserJoinedChat(RoomMembership {
                user_id: user_id.clone(),
                conversation_id: conversation_id.clone(),
            }),
        );
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(
    tx: Box<dyn Transaction>,
    staged: Result<T, ChatError>,
) -> Result<T, ChatError> {
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback().await;
            Err(e)
        }
    }
}

async fn load_conversation(
    tx: &mut dyn Transaction,
    conversation_id: &ConversationId,
) -> Result<Conversation, ChatError> {
    tx.find_conversation(conversation_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("conversation '{}'", conversation_id)))
}

async fn add_in_tx(
    tx: &mut dyn Transaction,
    actor: &UserId,
    conversation_id: &ConversationId,
    candidates: &[UserId],
    now: Timestamp,
) -> Result<(Vec<UserId>, Vec<Participant>), ChatError> {
    let mut conversation = load_conversation(tx, conversation_id).await?;
    if conversation.kind != ConversationKind::Group {
        return Err(ChatError::Validation(
            "participants can only be added to a group conversation".to_string(),
        ));
    }
    if tx.find_participant(conversation_id, actor).await?.is_none() {
        return Err(ChatError::Forbidden(format!(
            "'{}' is not a participant of '{}'",
            actor, conversation_id
        )));
    }

    let existing: HashSet<UserId> = tx
        .list_participants(conversation_id)
        .await?
        .into_iter()
        .map(|p| p.user_id)
        .collect();
    let mut added = Vec::new();
    for user_id in candidates {
        if existing.contains(user_id) {
            continue;
        }
        tx.save_participant(Participant::new(
            user_id.clone(),
            conversation_id.clone(),
            ParticipantRole::Member,
            now,
        ))
        .await?;
        conversation.add_participant_ref(user_id.clone());
        added.push(user_id.clone());
    }
    if !added.is_empty() {
        conversation.touch(now);
        tx.save_conversation(conversation).await?;
    }

    let participants = tx.list_participants(conversation_id).await?;
    Ok((added, participants))
}

async fn remove_in_tx(
    tx: &mut dyn Transaction,
    actor: &UserId,
    conversation_id: &ConversationId,
    target: &UserId,
    now: Timestamp,
) -> Result<Vec<Participant>, ChatError> {
    let mut conversation = load_conversation(tx, conversation_id).await?;
    if actor != target {
        let is_admin = tx
            .find_participant(conversation_id, actor)
            .await?
            .is_some_and(|p| p.role == ParticipantRole::Admin);
        if !is_admin {
            return Err(ChatError::Forbidden(format!(
                "'{}' may not remove '{}' from '{}'",
                actor, target, conversation_id
            )));
        }
    }
    if !tx.delete_participant(conversation_id, target).await? {
        return Err(ChatError::NotFound(format!(
            "participant '{}' in conversation '{}'",
            target, conversation_id
        )));
    }
    conversation.remove_participant_ref(target);
    conversation.touch(now);
    tx.save_conversation(conversation).await?;
    Ok(tx.list_participants(conversation_id).await?)
}
