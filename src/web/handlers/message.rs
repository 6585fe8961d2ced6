//! Message handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use super::AppState;
use crate::message::{Message, SendMessage};
use crate::web::dto::{
    ApiResponse, CleanupResponse, MessageResponse, ReadMessageResponse, SendMessageRequest,
    SentItemResponse, UpdateLabelRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

type MessageList = Json<ApiResponse<Vec<MessageResponse>>>;

fn message_list(messages: Vec<Message>) -> MessageList {
    Json(ApiResponse::new(
        messages.into_iter().map(MessageResponse::from).collect(),
    ))
}

/// POST /api/messages - Send a message.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MessageResponse>>), ApiError> {
    let request = SendMessage::new(caller.user_id, req.receiver_email, req.subject, req.body)
        .with_read_limit(req.read_limit);
    let message = state.messages().send(request).await?;

    if let Some(wake) = &state.dispatch_wake {
        wake.notify_one();
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::new(message.into()))))
}

/// GET /api/messages/inbox
pub async fn list_inbox(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<MessageList, ApiError> {
    Ok(message_list(
        state.messages().list_inbox(caller.user_id).await?,
    ))
}

/// GET /api/messages/spam
pub async fn list_spam(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<MessageList, ApiError> {
    Ok(message_list(state.messages().list_spam(caller.user_id).await?))
}

/// GET /api/messages/trash
pub async fn list_trash(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<MessageList, ApiError> {
    Ok(message_list(
        state.messages().list_trash(caller.user_id).await?,
    ))
}

/// GET /api/messages/sent - Sent messages, including destroyed ones.
pub async fn list_sent(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<ApiResponse<Vec<SentItemResponse>>>, ApiError> {
    let entries = state.messages().list_sent(caller.user_id).await?;
    Ok(Json(ApiResponse::new(
        entries.into_iter().map(SentItemResponse::from).collect(),
    )))
}

/// GET /api/messages/:id - Open a message, applying the read side effect.
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(message_id): Path<i64>,
) -> Result<Json<ApiResponse<ReadMessageResponse>>, ApiError> {
    let outcome = state
        .messages()
        .get_with_read_side_effect(message_id, caller.user_id)
        .await?;

    Ok(Json(ApiResponse::new(outcome.into())))
}

/// PUT /api/messages/:id/label
pub async fn update_label(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(message_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateLabelRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let message = state
        .messages()
        .update_label(message_id, caller.user_id, &req.label)
        .await?;
    Ok(Json(ApiResponse::new(message.into())))
}

/// POST /api/messages/cleanup - Sweep expired messages now.
pub async fn cleanup_expired(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<ApiResponse<CleanupResponse>>, ApiError> {
    let deleted = state.messages().sweep_expired(Utc::now()).await?;
    tracing::debug!(user_id = caller.user_id, deleted, "Manual expiry sweep");
    Ok(Json(ApiResponse::new(CleanupResponse { deleted })))
}
