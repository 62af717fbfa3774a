use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{AuthUser, NewNotification};
use crate::services::notifications;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

/// GET /api/notifications
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let items = notifications::list(&state.db, &user.id, query.unread_only, limit).await?;
    Ok(Json(items))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let count = notifications::unread_count(&state.db, &user.id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

/// POST /api/notifications
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<NewNotification>,
) -> AppResult<impl IntoResponse> {
    let notification = notifications::create(&state, &user.id, body).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let notification = notifications::mark_read(&state.db, &user.id, &id).await?;
    Ok(Json(notification))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let updated = notifications::mark_all_read(&state.db, &user.id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
