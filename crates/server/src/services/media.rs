//! Chunked media transfer: live relay to the room plus server-side reassembly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tokio::task::JoinHandle;

use rally_shared::validation::{validate_chunk_count, validate_file_name};

use super::messages::{fetch_room, hydrate};
use crate::error::{AppError, AppResult};
use crate::models::{timestamp_now, AuthUser, FileRef, Message, MessageRow, MessageType};
use crate::storage::StoredFile;
use crate::ws::events::ServerEvent;
use crate::ws::gateway::chunks::{ChunkAccepted, ChunkError, ChunkSession, TransferMeta};
use crate::ws::gateway::ClientId;
use crate::AppState;

const MAX_MESSAGE_ID_LEN: usize = 64;

/// Declared metadata from `chunked_media_start`.
#[derive(Debug, Clone)]
pub struct TransferStart {
    pub message_id: String,
    pub room_id: String,
    pub file_name: String,
    pub file_type: String,
    pub total_chunks: u32,
    pub file_size: u64,
}

/// Decode a chunk payload, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_chunk(chunk: &str) -> AppResult<Vec<u8>> {
    let encoded = match chunk.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => chunk,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|_| AppError::BadRequest("Chunk is not valid base64".into()))
}

pub async fn start_transfer(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    start: TransferStart,
) -> AppResult<()> {
    if start.message_id.is_empty() || start.message_id.len() > MAX_MESSAGE_ID_LEN {
        return Err(AppError::BadRequest("Invalid message id".into()));
    }
    validate_file_name(&start.file_name).map_err(AppError::BadRequest)?;
    validate_chunk_count(start.total_chunks).map_err(AppError::BadRequest)?;
    if start.file_size == 0 {
        return Err(AppError::BadRequest("File size is required".into()));
    }
    if start.file_size > state.config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge);
    }
    fetch_room(&state.db, &start.room_id).await?;

    let existing = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
        .bind(&start.message_id)
        .fetch_optional(&state.db)
        .await?;
    if let Some(row) = &existing {
        if row.sender_id != user.id {
            return Err(AppError::Forbidden("Message belongs to another user".into()));
        }
        if row.room_id.as_deref() != Some(start.room_id.as_str()) {
            return Err(AppError::BadRequest("Message belongs to another room".into()));
        }
        if row.is_deleted {
            return Err(AppError::BadRequest("Message was deleted".into()));
        }
    }

    let meta = TransferMeta {
        message_id: start.message_id.clone(),
        room_id: start.room_id.clone(),
        sender_id: user.id.clone(),
        owner: client_id,
        file_name: start.file_name.clone(),
        file_type: start.file_type.clone(),
        file_size: start.file_size,
        total_chunks: start.total_chunks,
        created_placeholder: existing.is_none(),
    };
    state.gateway.chunks.start(meta).await?;

    let order = state.gateway.send_order.lock(&start.room_id).await;
    if existing.is_none() {
        let inserted = sqlx::query(
            r#"INSERT INTO messages (id, sender_id, room_id, content, message_type, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&start.message_id)
        .bind(&user.id)
        .bind(&start.room_id)
        .bind(&start.file_name)
        .bind(MessageType::from_mime(&start.file_type))
        .bind(timestamp_now())
        .execute(&state.db)
        .await;
        if let Err(e) = inserted {
            state.gateway.chunks.remove(&start.message_id).await;
            return Err(e.into());
        }
    }

    tracing::debug!(
        message_id = %start.message_id,
        room_id = %start.room_id,
        total_chunks = start.total_chunks,
        "chunked transfer started"
    );
    state
        .gateway
        .broadcast_room(
            &start.room_id,
            &ServerEvent::ChunkedMediaStart {
                message_id: start.message_id,
                room_id: start.room_id.clone(),
                sender_id: user.id.clone(),
                file_name: start.file_name,
                file_type: start.file_type,
                total_chunks: start.total_chunks,
                file_size: start.file_size,
            },
            None,
        )
        .await;
    drop(order);
    Ok(())
}

/// Validate and store one chunk, relay it verbatim, and finish the transfer once complete.
/// Returns the final message when this chunk completed the transfer.
pub async fn accept_chunk(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    message_id: &str,
    chunk_index: u32,
    chunk: String,
    is_last_chunk: bool,
) -> AppResult<Option<Message>> {
    let data = decode_chunk(&chunk)?;
    let room_id = state
        .gateway
        .chunks
        .room_of(message_id)
        .await
        .ok_or(AppError::NotFound("Transfer"))?;

    let accepted = state
        .gateway
        .chunks
        .accept(
            message_id,
            &user.id,
            chunk_index,
            data,
            is_last_chunk,
            state.config.max_upload_bytes,
        )
        .await;

    let accepted = match accepted {
        Ok(a) => a,
        Err(ChunkError::TooLarge { limit }) => {
            // can never complete within bounds
            if let Some(session) = state.gateway.chunks.remove(message_id).await {
                abandon(state, &session.meta).await;
            }
            return Err(ChunkError::TooLarge { limit }.into());
        }
        Err(e) => return Err(e.into()),
    };

    state
        .gateway
        .broadcast_room(
            &room_id,
            &ServerEvent::ChunkedMediaChunk {
                message_id: message_id.to_string(),
                room_id: room_id.clone(),
                chunk_index,
                chunk,
                is_last_chunk,
            },
            Some(client_id),
        )
        .await;

    match accepted {
        ChunkAccepted::Pending { received, total } => {
            tracing::debug!(message_id = %message_id, received, total, "chunk received");
            Ok(None)
        }
        ChunkAccepted::Complete(session) => finish_transfer(state, session).await.map(Some),
    }
}

/// Reassemble, persist, and point the message at the stored file. Any failure abandons
/// the transfer so no partial artifact is ever referenced.
pub async fn finish_transfer(state: &AppState, session: ChunkSession) -> AppResult<Message> {
    let meta = session.meta.clone();
    let data = match session.assemble() {
        Ok(data) => data,
        Err(e) => {
            abandon(state, &meta).await;
            return Err(e.into());
        }
    };

    let stored = match state.files.store(&meta.file_name, &data).await {
        Ok(stored) => stored,
        Err(e) => {
            abandon(state, &meta).await;
            return Err(e);
        }
    };

    let row = match attach_file(state, &meta, &stored).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::warn!(message_id = %meta.message_id, "message gone before transfer completed");
            discard_stored(state, &stored).await;
            abandon(state, &meta).await;
            return Err(AppError::NotFound("Message"));
        }
        Err(e) => {
            tracing::error!(message_id = %meta.message_id, error = %e, "failed to attach transferred file");
            discard_stored(state, &stored).await;
            abandon(state, &meta).await;
            return Err(e);
        }
    };

    let file = FileRef {
        url: stored.url,
        name: stored.file_name,
        size: Some(stored.size as i64),
        duration: None,
    };
    state
        .gateway
        .broadcast_room(
            &meta.room_id,
            &ServerEvent::ChunkedMediaComplete {
                message_id: meta.message_id.clone(),
                room_id: meta.room_id.clone(),
                file_type: meta.file_type.clone(),
                file,
            },
            None,
        )
        .await;

    let message = hydrate(&state.db, row).await?;
    state
        .gateway
        .broadcast_room(&meta.room_id, &ServerEvent::MessageUpdated { message: message.clone() }, None)
        .await;

    tracing::info!(
        message_id = %meta.message_id,
        room_id = %meta.room_id,
        bytes = data.len(),
        "chunked transfer complete"
    );
    Ok(message)
}

/// Point the message at the stored file and read it back in one transaction.
/// `None` when the message was deleted meanwhile.
async fn attach_file(state: &AppState, meta: &TransferMeta, stored: &StoredFile) -> AppResult<Option<MessageRow>> {
    let mut tx = state.db.begin().await?;
    let updated = sqlx::query(
        r#"UPDATE messages
           SET file_url = ?, file_name = ?, file_size = ?, message_type = ?
           WHERE id = ? AND is_deleted = 0"#,
    )
    .bind(&stored.url)
    .bind(&stored.file_name)
    .bind(stored.size as i64)
    .bind(MessageType::from_mime(&meta.file_type))
    .bind(&meta.message_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
        .bind(&meta.message_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(row))
}

/// Remove a stored file that no message will reference.
async fn discard_stored(state: &AppState, stored: &StoredFile) {
    let Some(dir) = state
        .files
        .path_of(&stored.id, &stored.file_name)
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()))
    else {
        return;
    };
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        tracing::warn!(file_id = %stored.id, error = %e, "failed to remove orphaned file");
    }
}

/// Drop the transfer's placeholder message (if it made one) and tell the room.
pub async fn abandon(state: &AppState, meta: &TransferMeta) {
    if meta.created_placeholder {
        let deleted = sqlx::query("DELETE FROM messages WHERE id = ? AND file_url IS NULL")
            .bind(&meta.message_id)
            .execute(&state.db)
            .await;
        if let Err(e) = deleted {
            tracing::warn!(message_id = %meta.message_id, error = %e, "failed to remove transfer placeholder");
        }
    }

    state
        .gateway
        .broadcast_room(
            &meta.room_id,
            &ServerEvent::ChunkedMediaAbandoned {
                message_id: meta.message_id.clone(),
                room_id: meta.room_id.clone(),
            },
            None,
        )
        .await;
    tracing::info!(message_id = %meta.message_id, room_id = %meta.room_id, "chunked transfer abandoned");
}

pub async fn abandon_for_connection(state: &AppState, client_id: ClientId) -> usize {
    let sessions = state.gateway.chunks.remove_owned_by(client_id).await;
    for session in &sessions {
        abandon(state, &session.meta).await;
    }
    sessions.len()
}

pub async fn sweep_idle(state: &AppState) -> usize {
    let sessions = state
        .gateway
        .chunks
        .remove_idle(state.config.chunk_session_timeout())
        .await;
    for session in &sessions {
        abandon(state, &session.meta).await;
    }
    sessions.len()
}

/// Periodically abandon transfers that stopped receiving chunks.
pub fn spawn_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.chunk_sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let swept = sweep_idle(&state).await;
            if swept > 0 {
                tracing::info!(count = swept, "swept idle chunked transfers");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_data_url_chunks() {
        assert_eq!(decode_chunk("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_chunk("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        assert!(matches!(decode_chunk("not base64!"), Err(AppError::BadRequest(_))));
    }
}
