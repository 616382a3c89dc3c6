//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::UserId,
    infrastructure::dto::websocket::ClientEvent,
    ui::state::AppState,
    usecase::{ChatError, SessionHandle},
};

use super::bearer_token;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Authenticate the upgrade request, then hand the socket to a session.
///
/// The credential comes from `?token=` or `Authorization: Bearer`. A missing
/// or rejected credential refuses the upgrade with 401.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .unwrap_or_default()
        .to_string();

    let user_id = match state.connection_manager.authenticate(&token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!("Rejected WebSocket upgrade: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

/// Spawns a task that forwards serialized events from the dispatcher to the
/// WebSocket sender.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    let session = match state.connection_manager.connect(user_id.clone(), tx).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to open session for '{}': {}", user_id, e);
            return;
        }
    };

    let recv_state = state.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error from '{}': {}", recv_session.user_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let state = recv_state.clone();
                    let session = recv_session.clone();
                    let text = text.to_string();
                    // In-flight work runs to completion even if the socket is torn down
                    let handled =
                        tokio::spawn(async move { handle_event(&state, &session, &text).await });
                    if let Err(e) = handled.await {
                        tracing::error!("Event handler failed: {}", e);
                    }
                }
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                }
                Message::Close(_) => {
                    tracing::info!("Client '{}' requested close", recv_session.user_id);
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.connection_manager.disconnect(&session).await;
}

async fn handle_event(state: &AppState, session: &SessionHandle, text: &str) {
    let manager = &state.connection_manager;
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            manager.report_error(
                session,
                "Invalid event",
                &ChatError::Validation(e.to_string()),
            );
            return;
        }
    };
    tracing::debug!("Event from '{}': {:?}", session.user_id, event);

    let label = event.failure_label();
    let result = match event {
        ClientEvent::JoinChat(conversation) => {
            manager.join_chat(session, &conversation.into_id()).await
        }
        ClientEvent::LeaveChat(conversation) => {
            manager.leave_chat(session, &conversation.into_id()).await
        }
        ClientEvent::Typing(request) => {
            manager
                .typing(session, &request.conversation_id, request.is_typing)
                .await
        }
        ClientEvent::SendMessage(request) => {
            if let Err(e) = state
                .message_pipeline
                .send_message(&session.user_id, &request.conversation_id, &request.content)
                .await
            {
                manager.report_send_failure(session, &e);
            }
            return;
        }
        ClientEvent::MarkMessagesRead(request) => state
            .read_receipts
            .mark_messages_read(
                &session.user_id,
                &session.connection_id,
                &request.conversation_id,
                &request.message_ids,
            )
            .await
            .map(|_| ()),
    };

    if let Err(e) = result {
        manager.report_error(session, label, &e);
    }
}
