//! Huddle chat coordinator.
//!
//! Maintains per-conversation presence and typing state, fans out messages
//! and read receipts over WebSocket, and persists messages through a
//! transactional store.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
