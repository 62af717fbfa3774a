use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{AuthUser, DeleteScope};
use crate::services::messages;
use crate::AppState;

#[derive(Deserialize)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub scope: Option<DeleteScope>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub message_ids: Vec<String>,
}

/// PATCH /api/messages/{messageId}
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(message_id): Path<String>,
    Json(body): Json<EditRequest>,
) -> AppResult<impl IntoResponse> {
    messages::edit_message(&state, &user, &message_id, None, body.content).await?;
    let message = messages::load_message(&state.db, &message_id).await?;
    Ok(Json(message))
}

/// DELETE /api/messages/{messageId}?scope=me|everyone
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(message_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<impl IntoResponse> {
    let scope = query.scope.unwrap_or(DeleteScope::Me);
    messages::delete_message(&state, &user, &message_id, None, scope, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/messages
pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<BulkDeleteRequest>,
) -> AppResult<impl IntoResponse> {
    let deleted = messages::bulk_delete(&state, &user, &body.message_ids).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
