//! Data Transfer Objects (DTOs) for the coordinator.
//!
//! DTOs are organized by protocol:
//! - `websocket`: inbound WebSocket events
//! - `http`: HTTP API request/response bodies
//! - `conversion`: domain -> HTTP DTO conversions

pub mod conversion;
pub mod http;
pub mod websocket;
