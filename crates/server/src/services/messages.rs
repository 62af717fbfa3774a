//! Room message fanout and the mutations shared with direct messages.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use rally_shared::constants::{
    DELETED_MESSAGE_PLACEHOLDER, MAX_BULK_DELETE, MAX_MESSAGE_LENGTH, MAX_READ_BATCH, MESSAGE_PAGE_SIZE,
};
use rally_shared::validation::{validate_emoji, validate_file_name, validate_message_content};

use super::delivery::{self, compute_status, DeliveryStatus};
use crate::error::{AppError, AppResult};
use crate::models::{
    group_reactions, timestamp_now, AuthUser, Community, DeleteScope, Message, MessageDraft, MessageRow,
    Moderation, PaginatedResponse, ReactionGroup, ReadReceipt,
};
use crate::tasks::spawn_background;
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// A message as listed over REST, with its delivery status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub status: DeliveryStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(MESSAGE_PAGE_SIZE).clamp(1, MESSAGE_PAGE_SIZE * 2)
    }
}

pub async fn fetch_room(db: &SqlitePool, room_id: &str) -> AppResult<Community> {
    sqlx::query_as::<_, Community>(
        "SELECT id, name, owner_id, active_members, created_at FROM communities WHERE id = ?",
    )
    .bind(room_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound("Room"))
}

pub async fn load_row(db: &SqlitePool, message_id: &str) -> AppResult<MessageRow> {
    sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Message"))
}

pub async fn read_receipts(db: &SqlitePool, message_id: &str) -> AppResult<Vec<ReadReceipt>> {
    let rows = sqlx::query_as::<_, ReadReceipt>(
        "SELECT user_id, read_at FROM message_reads WHERE message_id = ? ORDER BY read_at, user_id",
    )
    .bind(message_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn reactions_of(db: &SqlitePool, message_id: &str) -> AppResult<Vec<ReactionGroup>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT emoji, user_id FROM reactions WHERE message_id = ? ORDER BY created_at, id",
    )
    .bind(message_id)
    .fetch_all(db)
    .await?;
    Ok(group_reactions(rows))
}

/// Attach read receipts and reactions to a stored row.
pub async fn hydrate(db: &SqlitePool, row: MessageRow) -> AppResult<Message> {
    let read_by = read_receipts(db, &row.id).await?;
    let reactions = reactions_of(db, &row.id).await?;
    Ok(Message::from_row(row, read_by, reactions))
}

pub async fn load_message(db: &SqlitePool, message_id: &str) -> AppResult<Message> {
    let row = load_row(db, message_id).await?;
    hydrate(db, row).await
}

pub fn validate_draft(draft: &MessageDraft) -> AppResult<()> {
    match &draft.file {
        None if draft.message_type.is_media() => {
            Err(AppError::BadRequest("Media messages require a file".into()))
        }
        None => validate_message_content(&draft.content).map_err(AppError::BadRequest),
        Some(file) => {
            validate_file_name(&file.name).map_err(AppError::BadRequest)?;
            if file.url.trim().is_empty() {
                return Err(AppError::BadRequest("File URL is required".into()));
            }
            if draft.content.chars().count() > MAX_MESSAGE_LENGTH {
                return Err(AppError::BadRequest(format!(
                    "Message must be at most {} characters",
                    MAX_MESSAGE_LENGTH
                )));
            }
            Ok(())
        }
    }
}

pub(crate) fn draft_row(
    sender_id: &str,
    room_id: Option<&str>,
    receiver_id: Option<&str>,
    draft: MessageDraft,
) -> MessageRow {
    let file = draft.file;
    MessageRow {
        id: uuid::Uuid::new_v4().to_string(),
        sender_id: sender_id.to_string(),
        room_id: room_id.map(str::to_string),
        receiver_id: receiver_id.map(str::to_string),
        content: draft.content,
        message_type: draft.message_type,
        file_url: file.as_ref().map(|f| f.url.clone()),
        file_name: file.as_ref().map(|f| f.name.clone()),
        file_size: file.as_ref().and_then(|f| f.size),
        file_duration: file.as_ref().and_then(|f| f.duration),
        reply_to: draft.reply_to,
        is_edited: false,
        is_deleted: false,
        moderation: None,
        created_at: timestamp_now(),
    }
}

pub(crate) async fn insert_row(db: &SqlitePool, row: &MessageRow) -> AppResult<()> {
    sqlx::query(
        r#"INSERT INTO messages
           (id, sender_id, room_id, receiver_id, content, message_type,
            file_url, file_name, file_size, file_duration, reply_to, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.sender_id)
    .bind(&row.room_id)
    .bind(&row.receiver_id)
    .bind(&row.content)
    .bind(row.message_type)
    .bind(&row.file_url)
    .bind(&row.file_name)
    .bind(row.file_size)
    .bind(row.file_duration)
    .bind(&row.reply_to)
    .bind(&row.created_at)
    .execute(db)
    .await?;
    Ok(())
}

/// A reply must point at a message in the same conversation.
pub(crate) async fn ensure_reply_target(db: &SqlitePool, row: &MessageRow) -> AppResult<()> {
    let Some(reply_to) = row.reply_to.as_deref() else {
        return Ok(());
    };
    let target = load_row(db, reply_to).await?;
    let same_conversation = match (&row.room_id, &row.receiver_id) {
        (Some(room), _) => target.room_id.as_deref() == Some(room.as_str()),
        (None, Some(receiver)) => {
            let sender_in_target =
                target.sender_id == row.sender_id || target.receiver_id.as_deref() == Some(row.sender_id.as_str());
            sender_in_target && target.peer_of(&row.sender_id) == Some(receiver.as_str())
        }
        (None, None) => false,
    };
    if !same_conversation {
        return Err(AppError::BadRequest("Reply target is in another conversation".into()));
    }
    Ok(())
}

/// The room id, when given, has to match where the message actually lives.
fn check_room(row: &MessageRow, room_id: Option<&str>) -> AppResult<()> {
    match room_id {
        Some(room) if row.room_id.as_deref() != Some(room) => Err(AppError::NotFound("Message")),
        _ => Ok(()),
    }
}

/// Direct messages are invisible to anyone but the two participants.
pub(crate) fn ensure_visible(row: &MessageRow, user_id: &str) -> AppResult<()> {
    if row.room_id.is_none()
        && row.sender_id != user_id
        && row.receiver_id.as_deref() != Some(user_id)
    {
        return Err(AppError::NotFound("Message"));
    }
    Ok(())
}

/// Push an event to everyone who can see the message: the room, or both direct participants.
pub(crate) async fn fan_out(state: &AppState, row: &MessageRow, event: &ServerEvent) -> usize {
    match (&row.room_id, &row.receiver_id) {
        (Some(room_id), _) => state.gateway.broadcast_room(room_id, event, None).await,
        (None, Some(receiver_id)) => {
            state
                .gateway
                .send_to_users(&[row.sender_id.as_str(), receiver_id.as_str()], event)
                .await
        }
        (None, None) => 0,
    }
}

pub(crate) async fn send_status(state: &AppState, row: &MessageRow) -> AppResult<DeliveryStatus> {
    let snapshot = delivery::message_delivery(&state.db, row).await?;
    state
        .gateway
        .send_to_user(
            &row.sender_id,
            &ServerEvent::MessageStatusUpdate {
                message_id: row.id.clone(),
                room_id: row.room_id.clone(),
                status: snapshot.status,
                read_count: snapshot.read_count,
                recipient_count: snapshot.recipient_count,
            },
            None,
        )
        .await;
    Ok(snapshot.status)
}

/// Persist, broadcast to the room, then echo the delivery status to the sender.
pub async fn send_to_room(
    state: &Arc<AppState>,
    user: &AuthUser,
    room_id: &str,
    draft: MessageDraft,
) -> AppResult<Message> {
    validate_draft(&draft)?;
    fetch_room(&state.db, room_id).await?;

    let order = state.gateway.send_order.lock(room_id).await;
    let row = draft_row(&user.id, Some(room_id), None, draft);
    ensure_reply_target(&state.db, &row).await?;
    insert_row(&state.db, &row).await?;

    state.gateway.typing_stop(room_id, &user.id).await;

    let message = Message::from_row(row.clone(), Vec::new(), Vec::new());
    let delivered = state
        .gateway
        .broadcast_room(room_id, &ServerEvent::NewMessage { message: message.clone() }, None)
        .await;
    drop(order);
    tracing::debug!(room_id = %room_id, message_id = %row.id, connections = delivered, "message broadcast");

    send_status(state, &row).await?;
    spawn_classification(state, &row);
    Ok(message)
}

/// Record read receipts for room messages. Unknown ids and the reader's own
/// messages are skipped. Returns the ids newly marked read.
pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    room_id: &str,
    message_ids: &[String],
) -> AppResult<Vec<String>> {
    if message_ids.len() > MAX_READ_BATCH {
        return Err(AppError::BadRequest(format!(
            "At most {} messages per read receipt",
            MAX_READ_BATCH
        )));
    }
    fetch_room(&state.db, room_id).await?;

    let read_at = timestamp_now();
    let mut newly_read = Vec::new();
    for message_id in message_ids {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ? AND room_id = ?")
            .bind(message_id)
            .bind(room_id)
            .fetch_optional(&state.db)
            .await?;
        let Some(row) = row else { continue };
        if row.sender_id == user.id {
            continue;
        }

        let inserted = sqlx::query("INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(&row.id)
            .bind(&user.id)
            .bind(&read_at)
            .execute(&state.db)
            .await?;
        if inserted.rows_affected() > 0 {
            newly_read.push(row);
        }
    }

    if newly_read.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = newly_read.iter().map(|r| r.id.clone()).collect();
    state
        .gateway
        .broadcast_room(
            room_id,
            &ServerEvent::MessagesReadReceipt {
                room_id: Some(room_id.to_string()),
                reader_id: user.id.clone(),
                message_ids: ids.clone(),
                read_at,
            },
            None,
        )
        .await;

    // status has to be recomputed on every batch, not only at send time
    for row in &newly_read {
        send_status(state, row).await?;
    }
    Ok(ids)
}

pub async fn edit_message(
    state: &Arc<AppState>,
    user: &AuthUser,
    message_id: &str,
    room_id: Option<&str>,
    content: String,
) -> AppResult<()> {
    validate_message_content(&content).map_err(AppError::BadRequest)?;

    let mut row = load_row(&state.db, message_id).await?;
    check_room(&row, room_id)?;
    ensure_visible(&row, &user.id)?;
    if row.sender_id != user.id {
        return Err(AppError::Forbidden("Only the author can edit this message".into()));
    }
    if row.is_deleted {
        return Err(AppError::BadRequest("Deleted messages cannot be edited".into()));
    }

    sqlx::query("UPDATE messages SET content = ?, is_edited = 1, moderation = NULL WHERE id = ?")
        .bind(&content)
        .bind(message_id)
        .execute(&state.db)
        .await?;

    row.content = content;
    row.is_edited = true;
    fan_out(
        state,
        &row,
        &ServerEvent::MessageEdited {
            message_id: row.id.clone(),
            room_id: row.room_id.clone(),
            content: row.content.clone(),
            is_edited: true,
        },
    )
    .await;

    spawn_classification(state, &row);
    Ok(())
}

/// `Me` hides the message for the caller only and syncs their other devices;
/// `Everyone` replaces it with the placeholder for all participants.
pub async fn delete_message(
    state: &AppState,
    user: &AuthUser,
    message_id: &str,
    room_id: Option<&str>,
    scope: DeleteScope,
    origin: Option<ClientId>,
) -> AppResult<()> {
    let row = load_row(&state.db, message_id).await?;
    check_room(&row, room_id)?;
    ensure_visible(&row, &user.id)?;

    match scope {
        DeleteScope::Me => {
            sqlx::query("INSERT OR IGNORE INTO message_hidden (message_id, user_id) VALUES (?, ?)")
                .bind(message_id)
                .bind(&user.id)
                .execute(&state.db)
                .await?;

            state
                .gateway
                .send_to_user(
                    &user.id,
                    &ServerEvent::MessageDeleted {
                        message_id: row.id.clone(),
                        room_id: row.room_id.clone(),
                        scope,
                        content: None,
                    },
                    origin,
                )
                .await;
        }
        DeleteScope::Everyone => {
            let mut allowed = row.sender_id == user.id;
            if !allowed {
                if let Some(room_id) = row.room_id.as_deref() {
                    allowed = fetch_room(&state.db, room_id).await?.owner_id == user.id;
                }
            }
            if !allowed {
                return Err(AppError::Forbidden(
                    "Only the author or the room owner can delete this message for everyone".into(),
                ));
            }

            sqlx::query(
                r#"UPDATE messages
                   SET content = ?, is_deleted = 1, file_url = NULL, file_name = NULL,
                       file_size = NULL, file_duration = NULL, moderation = NULL
                   WHERE id = ?"#,
            )
            .bind(DELETED_MESSAGE_PLACEHOLDER)
            .bind(message_id)
            .execute(&state.db)
            .await?;

            fan_out(
                state,
                &row,
                &ServerEvent::MessageDeleted {
                    message_id: row.id.clone(),
                    room_id: row.room_id.clone(),
                    scope,
                    content: Some(DELETED_MESSAGE_PLACEHOLDER.to_string()),
                },
            )
            .await;
        }
    }
    Ok(())
}

/// Add the caller's reaction, or remove it when already present.
pub async fn toggle_reaction(
    state: &AppState,
    user: &AuthUser,
    message_id: &str,
    room_id: Option<&str>,
    emoji: &str,
) -> AppResult<Vec<ReactionGroup>> {
    validate_emoji(emoji).map_err(AppError::BadRequest)?;
    let emoji = emoji.trim();

    let row = load_row(&state.db, message_id).await?;
    check_room(&row, room_id)?;
    ensure_visible(&row, &user.id)?;
    if row.is_deleted {
        return Err(AppError::BadRequest("Cannot react to a deleted message".into()));
    }

    let removed = sqlx::query("DELETE FROM reactions WHERE message_id = ? AND user_id = ? AND emoji = ?")
        .bind(message_id)
        .bind(&user.id)
        .bind(emoji)
        .execute(&state.db)
        .await?;
    if removed.rows_affected() == 0 {
        sqlx::query("INSERT INTO reactions (id, message_id, user_id, emoji, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(message_id)
            .bind(&user.id)
            .bind(emoji)
            .bind(timestamp_now())
            .execute(&state.db)
            .await?;
    }

    let reactions = reactions_of(&state.db, message_id).await?;
    fan_out(
        state,
        &row,
        &ServerEvent::ReactionUpdated {
            message_id: row.id.clone(),
            room_id: row.room_id.clone(),
            reactions: reactions.clone(),
        },
    )
    .await;
    Ok(reactions)
}

/// Permanently remove the caller's own messages among `message_ids`. Returns how many went.
pub async fn bulk_delete(state: &AppState, user: &AuthUser, message_ids: &[String]) -> AppResult<usize> {
    if message_ids.is_empty() {
        return Err(AppError::BadRequest("No messages given".into()));
    }
    if message_ids.len() > MAX_BULK_DELETE {
        return Err(AppError::BadRequest(format!(
            "At most {} messages can be deleted at once",
            MAX_BULK_DELETE
        )));
    }

    let mut tx = state.db.begin().await?;
    let mut removed = Vec::new();
    for message_id in message_ids {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ? AND sender_id = ?")
            .bind(message_id)
            .bind(&user.id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else { continue };
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(&row.id)
            .execute(&mut *tx)
            .await?;
        removed.push(row);
    }
    tx.commit().await?;

    for row in &removed {
        fan_out(
            state,
            row,
            &ServerEvent::MessageDeleted {
                message_id: row.id.clone(),
                room_id: row.room_id.clone(),
                scope: DeleteScope::Everyone,
                content: None,
            },
        )
        .await;
    }
    tracing::info!(user_id = %user.id, count = removed.len(), "messages hard-deleted");
    Ok(removed.len())
}

/// Newest-first page of rows turned into an oldest-first page of views.
/// `recipients` is everyone the status is computed against; the sender is excluded per message.
pub(crate) async fn into_page(
    db: &SqlitePool,
    mut rows: Vec<MessageRow>,
    limit: i64,
    recipients: &[String],
) -> AppResult<PaginatedResponse<MessageView>> {
    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    rows.reverse();
    let cursor = if has_more {
        rows.first().map(|r| r.created_at.clone())
    } else {
        None
    };

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let message = hydrate(db, row).await?;
        let snapshot = compute_status(
            &message.sender_id,
            recipients.iter().map(String::as_str),
            message.read_by.iter().map(|r| r.user_id.as_str()),
        );
        items.push(MessageView {
            message,
            status: snapshot.status,
        });
    }

    Ok(PaginatedResponse {
        items,
        cursor,
        has_more,
    })
}

pub async fn list_room_messages(
    db: &SqlitePool,
    user: &AuthUser,
    room_id: &str,
    page: &PageQuery,
) -> AppResult<PaginatedResponse<MessageView>> {
    fetch_room(db, room_id).await?;
    let limit = page.page_size();

    let rows = sqlx::query_as::<_, MessageRow>(
        r#"SELECT m.* FROM messages m
           WHERE m.room_id = ?
             AND (? IS NULL OR m.created_at < ?)
             AND NOT EXISTS (
                 SELECT 1 FROM message_hidden h WHERE h.message_id = m.id AND h.user_id = ?
             )
           ORDER BY m.created_at DESC, m.id DESC
           LIMIT ?"#,
    )
    .bind(room_id)
    .bind(&page.before)
    .bind(&page.before)
    .bind(&user.id)
    .bind(limit + 1)
    .fetch_all(db)
    .await?;

    let members: Vec<String> = sqlx::query_scalar("SELECT user_id FROM community_members WHERE community_id = ?")
        .bind(room_id)
        .fetch_all(db)
        .await?;

    into_page(db, rows, limit, &members).await
}

/// Run the classifier off the request path and patch the message in place when it answers.
pub fn spawn_classification(state: &Arc<AppState>, row: &MessageRow) {
    if row.content.trim().is_empty() || row.is_deleted {
        return;
    }
    let state = Arc::clone(state);
    let row = row.clone();
    spawn_background("classify_message", async move { apply_classification(&state, row).await });
}

async fn apply_classification(
    state: &AppState,
    row: MessageRow,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(verdict) = state.classifier.classify(&row.content).await? else {
        return Ok(());
    };

    let moderation = Moderation {
        category: verdict.category,
        flagged: verdict.flagged,
    };
    let content = verdict.content.unwrap_or_else(|| row.content.clone());

    // an edit or delete that landed meanwhile wins
    let updated = sqlx::query(
        "UPDATE messages SET content = ?, moderation = ? WHERE id = ? AND content = ? AND is_deleted = 0",
    )
    .bind(&content)
    .bind(serde_json::to_string(&moderation)?)
    .bind(&row.id)
    .bind(&row.content)
    .execute(&state.db)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(());
    }

    fan_out(
        state,
        &row,
        &ServerEvent::MessageContentUpdated {
            message_id: row.id.clone(),
            room_id: row.room_id.clone(),
            content,
            moderation,
        },
    )
    .await;
    Ok(())
}
