use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{AuthUser, FileRef, MessageDraft, MessageType};
use crate::services::direct;
use crate::AppState;

pub async fn handle_send_direct(
    state: &Arc<AppState>,
    user: &AuthUser,
    receiver_id: String,
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
    direct::send_direct(state, user, &receiver_id, draft).await?;
    Ok(())
}

pub async fn handle_direct_read(
    state: &AppState,
    user: &AuthUser,
    peer_id: String,
    message_ids: Vec<String>,
) -> AppResult<()> {
    direct::mark_direct_read(state, user, &peer_id, &message_ids).await?;
    Ok(())
}
