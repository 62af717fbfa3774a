use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{AuthUser, DeleteScope, FileRef, MessageDraft, MessageType};
use crate::services::messages;
use crate::ws::gateway::ClientId;
use crate::AppState;

pub async fn handle_send_message(
    state: &Arc<AppState>,
    user: &AuthUser,
    room_id: String,
    content: String,
    message_type: MessageType,
    reply_to: Option<String>,
    file: Option<FileRef>,
) -> AppResult<()> {
    let draft = MessageDraft {
        content,
        message_type,
        reply_to,
        file,
    };
    messages::send_to_room(state, user, &room_id, draft).await?;
    Ok(())
}

/// Only a connection present in the room can announce typing there.
pub async fn handle_typing_start(
    state: &Arc<AppState>,
    client_id: ClientId,
    user: &AuthUser,
    room_id: String,
) -> AppResult<()> {
    if state.gateway.room_of(client_id).await.as_deref() != Some(room_id.as_str()) {
        return Err(AppError::BadRequest("Join the room before typing in it".into()));
    }
    state
        .gateway
        .typing_start(&room_id, &user.id, &user.username, Some(client_id))
        .await;
    Ok(())
}

pub async fn handle_typing_stop(state: &AppState, user: &AuthUser, room_id: &str) {
    state.gateway.typing_stop(room_id, &user.id).await;
}

pub async fn handle_messages_read(
    state: &AppState,
    user: &AuthUser,
    room_id: String,
    message_ids: Vec<String>,
) -> AppResult<()> {
    messages::mark_read(state, user, &room_id, &message_ids).await?;
    Ok(())
}

pub async fn handle_edit_message(
    state: &Arc<AppState>,
    user: &AuthUser,
    message_id: String,
    room_id: Option<String>,
    content: String,
) -> AppResult<()> {
    messages::edit_message(state, user, &message_id, room_id.as_deref(), content).await
}

pub async fn handle_delete_message(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    message_id: String,
    room_id: Option<String>,
    scope: DeleteScope,
) -> AppResult<()> {
    messages::delete_message(state, user, &message_id, room_id.as_deref(), scope, Some(client_id)).await
}

pub async fn handle_add_reaction(
    state: &AppState,
    user: &AuthUser,
    message_id: String,
    room_id: Option<String>,
    emoji: String,
) -> AppResult<()> {
    messages::toggle_reaction(state, user, &message_id, room_id.as_deref(), &emoji).await?;
    Ok(())
}
