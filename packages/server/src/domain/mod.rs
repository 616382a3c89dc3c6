//! Domain layer: entities, value objects and the interfaces the chat core
//! needs from the outside world.

pub mod auth;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod event;
pub mod repository;
pub mod room;
pub mod value_object;

pub use auth::CredentialVerifier;
pub use dispatcher::{BroadcastDispatcher, PusherChannel};
pub use entity::{
    Conversation, ConversationKind, LastMessage, Message, MessageView, Participant,
    ParticipantRole, ReadReceipt, User, UserSummary,
};
pub use error::{AuthError, RepositoryError, ValueObjectError};
pub use event::ServerEvent;
pub use repository::{
    ConversationRepository, MessageRepository, ParticipantRepository, Transaction,
    TransactionManager, UserRepository,
};
pub use room::{RoomSnapshot, RoomState, TypingEntry, TypingKey};
pub use value_object::{
    ConnectionId, ConversationId, MessageContent, MessageId, Timestamp, UserId,
};
