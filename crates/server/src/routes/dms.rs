use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{AuthUser, MessageDraft};
use crate::services::direct;
use crate::services::messages::PageQuery;
use crate::AppState;

/// GET /api/dms/{userId}/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(peer_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let page = direct::list_conversation(&state.db, &user, &peer_id, &page).await?;
    Ok(Json(page))
}

/// POST /api/dms/{userId}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(peer_id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> AppResult<impl IntoResponse> {
    let message = direct::send_direct(&state, &user, &peer_id, draft).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
