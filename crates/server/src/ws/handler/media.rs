use crate::error::AppResult;
use crate::models::AuthUser;
use crate::services::media::{self, TransferStart};
use crate::ws::gateway::ClientId;
use crate::AppState;

#[allow(clippy::too_many_arguments)]
pub async fn handle_start(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    message_id: String,
    room_id: String,
    file_name: String,
    file_type: String,
    total_chunks: u32,
    file_size: u64,
) -> AppResult<()> {
    let start = TransferStart {
        message_id,
        room_id,
        file_name,
        file_type,
        total_chunks,
        file_size,
    };
    media::start_transfer(state, client_id, user, start).await
}

pub async fn handle_chunk(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    message_id: String,
    chunk_index: u32,
    chunk: String,
    is_last_chunk: bool,
) -> AppResult<()> {
    media::accept_chunk(state, client_id, user, &message_id, chunk_index, chunk, is_last_chunk).await?;
    Ok(())
}
