//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::{
    handler::{
        add_participants, create_conversation, debug_room_state, get_conversation, get_message,
        health_check, list_conversations, list_messages, list_participants, post_message,
        remove_participant, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Chat coordinator server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(AppState::in_memory(&config, store, Arc::new(SystemClock)));
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route(
                "/api/conversations",
                get(list_conversations).post(create_conversation),
            )
            .route("/api/conversations/{conversation_id}", get(get_conversation))
            .route(
                "/api/conversations/{conversation_id}/messages",
                get(list_messages).post(post_message),
            )
            .route("/api/messages/{message_id}", get(get_message))
            .route(
                "/api/conversations/{conversation_id}/participants",
                get(list_participants).post(add_participants),
            )
            .route(
                "/api/conversations/{conversation_id}/participants/{user_id}",
                delete(remove_participant),
            )
            .route("/debug/rooms/{conversation_id}", get(debug_room_state))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind `host:port` and serve until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat coordinator listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?token=<access token>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener without signal handling
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }
}
