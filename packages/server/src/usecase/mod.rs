//! UseCase layer: the chat coordination core.

pub mod connection;
pub mod conversation;
pub mod error;
pub mod message_pipeline;
pub mod read_receipt;
pub mod room_state;
pub mod typing;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{ConnectionManager, DEFAULT_HISTORY_LIMIT, Directory};
pub use conversation::{ConversationService, MAX_HISTORY_PAGE, NewConversation};
pub use error::{ChatError, ConnectError};
pub use message_pipeline::MessagePipeline;
pub use read_receipt::{ReadOutcome, ReadReceiptSynchronizer};
pub use room_state::{RoomStateStore, Session, SessionHandle};
pub use typing::{DEFAULT_TYPING_TIMEOUT, TypingTracker};
