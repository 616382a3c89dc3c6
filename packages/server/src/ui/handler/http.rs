//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    domain::UserId,
    infrastructure::dto::http::{
        AddParticipantsRequest, ConversationDto, ConversationListQuery, CreateConversationRequest,
        ErrorResponse, HistoryQuery, MessageDto, ParticipantDto, PostMessageRequest, RoomStateDto,
    },
    ui::state::AppState,
    usecase::{ChatError, ConnectError, DEFAULT_HISTORY_LIMIT, NewConversation},
};

use super::bearer_token;

/// Error response with a status code and `{error, details}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, details: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                details: details.into(),
            },
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        let (status, error) = match &e {
            ChatError::Validation(_) => (StatusCode::BAD_REQUEST, "validation failed"),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, "not found"),
            ChatError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ChatError::Transaction(_) | ChatError::SessionClosed => {
                tracing::error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        ApiError::new(status, error, e.to_string())
    }
}

impl From<ConnectError> for ApiError {
    fn from(e: ConnectError) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn authenticated(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing bearer token",
        )
    })?;
    Ok(state.connection_manager.authenticate(token).await?)
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationDto>), ApiError> {
    let creator = authenticated(&state, &headers).await?;
    let conversation = state
        .conversations
        .create_conversation(
            &creator,
            NewConversation {
                kind: request.kind,
                name: request.name,
                participant_ids: request.participant_ids,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(conversation.into())))
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ConversationListQuery>,
) -> Result<Json<Vec<ConversationDto>>, ApiError> {
    let viewer = authenticated(&state, &headers).await?;
    let conversations = state
        .conversations
        .list_conversations(&viewer, query.kind)
        .await?;
    Ok(Json(conversations.into_iter().map(Into::into).collect()))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDto>, ApiError> {
    let viewer = authenticated(&state, &headers).await?;
    let conversation = state
        .conversations
        .get_conversation(&viewer, &conversation_id)
        .await?;
    Ok(Json(conversation.into()))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let viewer = authenticated(&state, &headers).await?;
    let messages = state
        .conversations
        .list_messages(
            &viewer,
            &conversation_id,
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Send over HTTP; the room still receives `newMessage`
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let sender = authenticated(&state, &headers).await?;
    let message = state
        .message_pipeline
        .send_message(&sender, &conversation_id, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}

pub async fn get_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
) -> Result<Json<MessageDto>, ApiError> {
    let viewer = authenticated(&state, &headers).await?;
    let message = state.conversations.get_message(&viewer, &message_id).await?;
    Ok(Json(message.into()))
}

pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<ParticipantDto>>, ApiError> {
    let viewer = authenticated(&state, &headers).await?;
    let participants = state
        .conversations
        .list_participants(&viewer, &conversation_id)
        .await?;
    Ok(Json(participants.into_iter().map(Into::into).collect()))
}

pub async fn add_participants(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(request): Json<AddParticipantsRequest>,
) -> Result<Json<Vec<ParticipantDto>>, ApiError> {
    let actor = authenticated(&state, &headers).await?;
    let participants = state
        .conversations
        .add_participants(&actor, &conversation_id, &request.user_ids)
        .await?;
    Ok(Json(participants.into_iter().map(Into::into).collect()))
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((conversation_id, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<ParticipantDto>>, ApiError> {
    let actor = authenticated(&state, &headers).await?;
    let participants = state
        .conversations
        .remove_participant(&actor, &conversation_id, &user_id)
        .await?;
    Ok(Json(participants.into_iter().map(Into::into).collect()))
}

/// Debug endpoint: live presence and typing state of one room, for its participants
pub async fn debug_room_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<RoomStateDto>, ApiError> {
    let viewer = authenticated(&state, &headers).await?;
    let conversation = state
        .conversations
        .get_conversation(&viewer, &conversation_id)
        .await?;
    let snapshot = state.room_state.snapshot(&conversation.id).await;
    Ok(Json(snapshot.into()))
}
