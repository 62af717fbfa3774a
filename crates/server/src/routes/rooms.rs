use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{AuthUser, MessageDraft};
use crate::services::messages::{self, PageQuery};
use crate::services::presence;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub message_ids: Vec<String>,
}

/// GET /api/rooms/{roomId}/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(room_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let page = messages::list_room_messages(&state.db, &user, &room_id, &page).await?;
    Ok(Json(page))
}

/// POST /api/rooms/{roomId}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(room_id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> AppResult<impl IntoResponse> {
    let message = messages::send_to_room(&state, &user, &room_id, draft).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/rooms/{roomId}/messages/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(room_id): Path<String>,
    Json(body): Json<ReadRequest>,
) -> AppResult<impl IntoResponse> {
    let read = messages::mark_read(&state, &user, &room_id, &body.message_ids).await?;
    Ok(Json(serde_json::json!({ "messageIds": read })))
}

/// GET /api/rooms/{roomId}/online
pub async fn online_users(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let users = presence::online_users(&state, &room_id).await?;
    let count = users.len();
    Ok(Json(serde_json::json!({ "roomId": room_id, "users": users, "count": count })))
}
