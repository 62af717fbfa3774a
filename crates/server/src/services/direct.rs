use sqlx::SqlitePool;
use std::sync::Arc;

use rally_shared::constants::MAX_READ_BATCH;

use super::delivery::DeliveryStatus;
use super::messages::{
    draft_row, ensure_reply_target, insert_row, into_page, send_status, spawn_classification, validate_draft,
    MessageView, PageQuery,
};
use super::notifications;
use crate::error::{AppError, AppResult};
use crate::models::{
    timestamp_now, AuthUser, Message, MessageDraft, MessageRow, NewNotification, NotificationKind,
    PaginatedResponse,
};
use crate::tasks::spawn_background;
use crate::ws::events::ServerEvent;
use crate::AppState;

const PREVIEW_CHARS: usize = 120;

async fn ensure_user(db: &SqlitePool, user_id: &str) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, String>(r#"SELECT id FROM "user" WHERE id = ?"#)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    found.map(|_| ()).ok_or(AppError::NotFound("User"))
}

fn preview(row: &MessageRow) -> String {
    if row.content.trim().is_empty() {
        return "Sent an attachment".into();
    }
    let mut text: String = row.content.chars().take(PREVIEW_CHARS).collect();
    if row.content.chars().count() > PREVIEW_CHARS {
        text.push('…');
    }
    text
}

/// Persist, push to both participants, and raise a `message` notification for the receiver.
pub async fn send_direct(
    state: &Arc<AppState>,
    user: &AuthUser,
    receiver_id: &str,
    draft: MessageDraft,
) -> AppResult<Message> {
    validate_draft(&draft)?;
    if receiver_id == user.id {
        return Err(AppError::BadRequest("Cannot send a direct message to yourself".into()));
    }
    ensure_user(&state.db, receiver_id).await?;

    let row = draft_row(&user.id, None, Some(receiver_id), draft);
    ensure_reply_target(&state.db, &row).await?;
    insert_row(&state.db, &row).await?;

    let message = Message::from_row(row.clone(), Vec::new(), Vec::new());
    state
        .gateway
        .send_to_users(
            &[user.id.as_str(), receiver_id],
            &ServerEvent::NewMessage { message: message.clone() },
        )
        .await;

    if state.gateway.is_online(receiver_id).await {
        state
            .gateway
            .send_to_user(
                &user.id,
                &ServerEvent::MessageStatusUpdate {
                    message_id: row.id.clone(),
                    room_id: None,
                    status: DeliveryStatus::Delivered,
                    read_count: 0,
                    recipient_count: 1,
                },
                None,
            )
            .await;
    }

    let notification = NewNotification {
        subject_id: Some(row.id.clone()),
        payload: serde_json::json!({ "messageId": row.id, "senderId": user.id }),
        ..NewNotification::to_user(receiver_id, NotificationKind::Message, user.username.clone(), preview(&row))
    };
    let task_state = Arc::clone(state);
    let sender_id = user.id.clone();
    spawn_background("direct_message_notification", async move {
        notifications::create(&task_state, &sender_id, notification).await.map(|_| ())
    });

    spawn_classification(state, &row);
    Ok(message)
}

/// Read receipts for messages `peer_id` sent to the caller. Returns the ids newly marked read.
pub async fn mark_direct_read(
    state: &AppState,
    user: &AuthUser,
    peer_id: &str,
    message_ids: &[String],
) -> AppResult<Vec<String>> {
    if message_ids.len() > MAX_READ_BATCH {
        return Err(AppError::BadRequest(format!(
            "At most {} messages per read receipt",
            MAX_READ_BATCH
        )));
    }

    let read_at = timestamp_now();
    let mut newly_read = Vec::new();
    for message_id in message_ids {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE id = ? AND sender_id = ? AND receiver_id = ?",
        )
        .bind(message_id)
        .bind(peer_id)
        .bind(&user.id)
        .fetch_optional(&state.db)
        .await?;
        let Some(row) = row else { continue };

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
    notifications::mark_message_notifications_read(&state.db, &user.id, &ids).await?;

    state
        .gateway
        .send_to_users(
            &[peer_id, user.id.as_str()],
            &ServerEvent::MessagesReadReceipt {
                room_id: None,
                reader_id: user.id.clone(),
                message_ids: ids.clone(),
                read_at,
            },
        )
        .await;

    for row in &newly_read {
        send_status(state, row).await?;
    }
    Ok(ids)
}

pub async fn list_conversation(
    db: &SqlitePool,
    user: &AuthUser,
    peer_id: &str,
    page: &PageQuery,
) -> AppResult<PaginatedResponse<MessageView>> {
    ensure_user(db, peer_id).await?;
    let limit = page.page_size();

    let rows = sqlx::query_as::<_, MessageRow>(
        r#"SELECT m.* FROM messages m
           WHERE ((m.sender_id = ? AND m.receiver_id = ?) OR (m.sender_id = ? AND m.receiver_id = ?))
             AND (? IS NULL OR m.created_at < ?)
             AND NOT EXISTS (
                 SELECT 1 FROM message_hidden h WHERE h.message_id = m.id AND h.user_id = ?
             )
           ORDER BY m.created_at DESC, m.id DESC
           LIMIT ?"#,
    )
    .bind(&user.id)
    .bind(peer_id)
    .bind(peer_id)
    .bind(&user.id)
    .bind(&page.before)
    .bind(&page.before)
    .bind(&user.id)
    .bind(limit + 1)
    .fetch_all(db)
    .await?;

    let participants = [user.id.clone(), peer_id.to_string()];
    into_page(db, rows, limit, &participants).await
}
