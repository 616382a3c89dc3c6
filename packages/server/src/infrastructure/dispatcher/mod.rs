//! BroadcastDispatcher implementations.
//!
//! - `websocket`: delivers serialized frames to WebSocket connections
//! - `recording`: records deliveries in memory, for tests and diagnostics
//!
//! Both route through the same [`RoutingTable`].

pub mod recording;
pub mod routing;
pub mod websocket;

pub use recording::{Delivery, RecordingDispatcher};
pub use routing::RoutingTable;
pub use websocket::WebSocketDispatcher;
