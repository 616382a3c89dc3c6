//! UseCase: message pipeline.
//!
//! validate -> clear typing -> transaction (insert + conversation pointer) ->
//! commit -> attach sender -> clear typing again and broadcast `newMessage`
//! under the room lock.
//!
//! Commit and broadcast for one conversation happen under a per-conversation
//! ordering lock, so subscribers observe messages in commit order.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use huddle_shared::time::Clock;

use crate::domain::{
    ConversationId, LastMessage, Message, MessageContent, MessageId, MessageView, ServerEvent,
    Timestamp, Transaction, TransactionManager, UserId, UserRepository, UserSummary,
    event::NewMessage,
};

use super::{error::ChatError, typing::TypingTracker};

pub struct MessagePipeline {
    transactions: Arc<dyn TransactionManager>,
    users: Arc<dyn UserRepository>,
    typing: TypingTracker,
    clock: Arc<dyn Clock>,
    ordering: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl MessagePipeline {
    pub fn new(
        transactions: Arc<dyn TransactionManager>,
        users: Arc<dyn UserRepository>,
        typing: TypingTracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions,
            users,
            typing,
            clock,
            ordering: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a message from `sender_id` and broadcast it to the room.
    ///
    /// Nothing is broadcast unless the transaction committed.
    pub async fn send_message(
        &self,
        sender_id: &UserId,
        conversation_id: &str,
        content: &str,
    ) -> Result<MessageView, ChatError> {
        let conversation_id = ConversationId::new(conversation_id.to_string())?;
        let content = MessageContent::new(content.to_string())?;

        self.typing.stop_before_send(sender_id, &conversation_id).await;

        let order = self.ordering_lock(&conversation_id);
        let _ordered = order.lock().await;

        let message = self
            .create_message(&conversation_id, sender_id, content)
            .await?;
        let view = attach_sender(self.users.as_ref(), message).await?;

        tracing::info!(
            "Message {} sent to conversation {} by {}",
            view.id,
            conversation_id,
            sender_id
        );
        self.typing
            .publish_after_stop(
                sender_id,
                &conversation_id,
                &ServerEvent::NewMessage(NewMessage {
                    success: true,
                    message: Some(view.clone()),
                    error: None,
                }),
            )
            .await;
        Ok(view)
    }

    /// Insert the message and advance the conversation pointer atomically
    pub async fn create_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: MessageContent,
    ) -> Result<Message, ChatError> {
        let now = Timestamp::new(self.clock.now_millis());
        let mut tx = self.transactions.begin().await?;
        match persist_message(tx.as_mut(), conversation_id, sender_id, content, now).await {
            Ok(message) => {
                tx.commit().await?;
                Ok(message)
            }
            Err(e) => {
                tx.rollback().await;
                Err(e)
            }
        }
    }

    fn ordering_lock(&self, conversation_id: &ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        self.ordering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.clone())
            .or_default()
            .clone()
    }
}

async fn persist_message(
    tx: &mut dyn Transaction,
    conversation_id: &ConversationId,
    sender_id: &UserId,
    content: MessageContent,
    now: Timestamp,
) -> Result<Message, ChatError> {
    let mut conversation = tx
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("conversation '{}'", conversation_id)))?;
    if tx
        .find_participant(conversation_id, sender_id)
        .await?
        .is_none()
    {
        return Err(ChatError::NotFound(format!(
            "participant '{}' in conversation '{}'",
            sender_id, conversation_id
        )));
    }

    let message = Message::new(
        MessageId::generate(),
        content,
        conversation_id.clone(),
        sender_id.clone(),
        now,
    );
    tx.insert_message(message.clone()).await?;

    conversation.record_last_message(LastMessage {
        message_id: message.id.clone(),
        timestamp: now,
    });
    conversation.touch(now);
    tx.save_conversation(conversation).await?;

    Ok(message)
}

/// Attach sender identities to messages, looking each sender up once.
///
/// A sender that no longer exists is shown by id.
pub(crate) async fn attach_senders(
    users: &dyn UserRepository,
    messages: Vec<Message>,
) -> Result<Vec<MessageView>, ChatError> {
    let mut senders: HashMap<UserId, UserSummary> = HashMap::new();
    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        let sender = match senders.get(&message.sender_id) {
            Some(summary) => summary.clone(),
            None => {
                let summary = match users.find_user(&message.sender_id).await? {
                    Some(user) => user.summary(),
                    None => UserSummary {
                        id: message.sender_id.clone(),
                        name: message.sender_id.to_string(),
                    },
                };
                senders.insert(message.sender_id.clone(), summary.clone());
                summary
            }
        };
        views.push(message.with_sender(sender));
    }
    Ok(views)
}

async fn attach_sender(
    users: &dyn UserRepository,
    message: Message,
) -> Result<MessageView, ChatError> {
    let mut views = attach_senders(users, vec![message]).await?;
    views
        .pop()
        .ok_or_else(|| ChatError::Transaction("message vanished after commit".to_string()))
}
