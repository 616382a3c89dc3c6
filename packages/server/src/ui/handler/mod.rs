//! Request handlers.

pub mod http;
pub mod websocket;

use axum::http::{HeaderMap, header::AUTHORIZATION};

pub use http::{
    add_participants, create_conversation, debug_room_state, get_conversation, get_message,
    health_check, list_conversations, list_messages, list_participants, post_message,
    remove_participant,
};
pub use websocket::websocket_handler;

/// Token from an `Authorization: Bearer <token>` header
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
