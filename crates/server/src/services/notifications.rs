//! Durable notifications: creation with burst dedupe, live push, and resync on connect.

use sqlx::SqlitePool;

use rally_shared::validation::validate_notification_text;

use super::messages::fetch_room;
use crate::error::{AppError, AppResult};
use crate::models::{
    timestamp_now, timestamp_secs_ago, NewNotification, Notification, NotificationRow, NotificationTarget,
};
use crate::ws::events::ServerEvent;
use crate::ws::gateway::{ClientId, GatewayState};
use crate::AppState;

/// Unread notifications visible to a user: addressed directly, or to a room they
/// belong to. Their own room broadcasts are excluded.
const VISIBLE_TO_USER: &str = r#"
    sender_id <> ?
    AND (receiver_id = ?
         OR room_id IN (SELECT community_id FROM community_members WHERE user_id = ?))"#;

async fn load(db: &SqlitePool, id: &str) -> AppResult<Notification> {
    let row = sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Notification"))?;
    Ok(row.into())
}

/// Id of an unread notification from the same burst, if one is inside the window.
async fn find_duplicate(
    db: &SqlitePool,
    sender_id: &str,
    receiver_id: &str,
    new: &NewNotification,
    window_secs: i64,
) -> AppResult<Option<String>> {
    let id = sqlx::query_scalar::<_, String>(
        r#"SELECT id FROM notifications
           WHERE sender_id = ? AND receiver_id = ? AND kind = ? AND subject_id IS ?
             AND is_read = 0 AND created_at >= ?
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(new.kind)
    .bind(&new.subject_id)
    .bind(timestamp_secs_ago(window_secs))
    .fetch_optional(db)
    .await?;
    Ok(id)
}

/// Persist a notification from `sender_id`, then push it to whoever is connected.
pub async fn create(state: &AppState, sender_id: &str, new: NewNotification) -> AppResult<Notification> {
    validate_notification_text(&new.title, &new.message).map_err(AppError::BadRequest)?;
    let target = new.target().ok_or_else(|| {
        AppError::BadRequest("Exactly one of receiverId or roomId is required".into())
    })?;

    match &target {
        NotificationTarget::User(receiver_id) => {
            if receiver_id == sender_id {
                return Err(AppError::BadRequest("Cannot notify yourself".into()));
            }
            let exists = sqlx::query_scalar::<_, String>(r#"SELECT id FROM "user" WHERE id = ?"#)
                .bind(receiver_id)
                .fetch_optional(&state.db)
                .await?;
            if exists.is_none() {
                return Err(AppError::NotFound("User"));
            }
        }
        NotificationTarget::Room(room_id) => {
            fetch_room(&state.db, room_id).await?;
        }
    }

    let payload = match &new.payload {
        serde_json::Value::Null => "{}".to_string(),
        value => value.to_string(),
    };
    let now = timestamp_now();

    let duplicate = match &target {
        NotificationTarget::User(receiver_id) if new.kind.dedupes() => {
            find_duplicate(
                &state.db,
                sender_id,
                receiver_id,
                &new,
                state.config.notification_dedupe_secs,
            )
            .await?
        }
        _ => None,
    };

    let id = match duplicate {
        Some(id) => {
            sqlx::query("UPDATE notifications SET title = ?, message = ?, payload = ?, created_at = ? WHERE id = ?")
                .bind(&new.title)
                .bind(&new.message)
                .bind(&payload)
                .bind(&now)
                .bind(&id)
                .execute(&state.db)
                .await?;
            tracing::debug!(notification_id = %id, "notification collapsed into unread duplicate");
            id
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(
                r#"INSERT INTO notifications
                   (id, sender_id, receiver_id, room_id, kind, title, message, subject_id, payload, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&id)
            .bind(sender_id)
            .bind(&new.receiver_id)
            .bind(&new.room_id)
            .bind(new.kind)
            .bind(&new.title)
            .bind(&new.message)
            .bind(&new.subject_id)
            .bind(&payload)
            .bind(&now)
            .execute(&state.db)
            .await?;
            id
        }
    };

    let notification = load(&state.db, &id).await?;
    let pushed = deliver(&state.gateway, &notification).await;
    tracing::debug!(notification_id = %id, connections = pushed, "notification delivered");
    Ok(notification)
}

/// Push to the receiver's connections, or to the room minus the sender. Returns frames queued;
/// zero just means the notification waits for resync.
pub async fn deliver(gateway: &GatewayState, notification: &Notification) -> usize {
    let event = ServerEvent::NotificationNew {
        notification: notification.clone(),
    };
    match notification.target() {
        NotificationTarget::User(user_id) => gateway.send_to_user(&user_id, &event, None).await,
        NotificationTarget::Room(room_id) => {
            gateway
                .broadcast_room_except_user(&room_id, &event, &notification.sender_id)
                .await
        }
    }
}

pub async fn unread_for(db: &SqlitePool, user_id: &str) -> AppResult<Vec<Notification>> {
    let sql = format!(
        "SELECT * FROM notifications WHERE is_read = 0 AND {} ORDER BY created_at, id",
        VISIBLE_TO_USER
    );
    let rows = sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(Notification::from).collect())
}

/// Replay every unread notification to a freshly opened connection as one batch.
/// The batch is sent even when empty so the client knows it is caught up.
pub async fn resync(state: &AppState, user_id: &str, client_id: ClientId) -> AppResult<usize> {
    let notifications = unread_for(&state.db, user_id).await?;
    let count = notifications.len();
    state
        .gateway
        .send_to(client_id, &ServerEvent::NotificationSync { notifications })
        .await;
    tracing::debug!(user_id = %user_id, count, "notifications resynced");
    Ok(count)
}

pub async fn list(db: &SqlitePool, user_id: &str, unread_only: bool, limit: i64) -> AppResult<Vec<Notification>> {
    let sql = format!(
        "SELECT * FROM notifications WHERE (? = 0 OR is_read = 0) AND {} ORDER BY created_at DESC, id DESC LIMIT ?",
        VISIBLE_TO_USER
    );
    let rows = sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(unread_only)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(Notification::from).collect())
}

pub async fn unread_count(db: &SqlitePool, user_id: &str) -> AppResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM notifications WHERE is_read = 0 AND {}",
        VISIBLE_TO_USER
    );
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}

pub async fn mark_read(db: &SqlitePool, user_id: &str, notification_id: &str) -> AppResult<Notification> {
    let sql = format!("SELECT COUNT(*) FROM notifications WHERE id = ? AND {}", VISIBLE_TO_USER);
    let visible = sqlx::query_scalar::<_, i64>(&sql)
        .bind(notification_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;
    if visible == 0 {
        return Err(AppError::NotFound("Notification"));
    }

    sqlx::query("UPDATE notifications SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0")
        .bind(timestamp_now())
        .bind(notification_id)
        .execute(db)
        .await?;
    load(db, notification_id).await
}

/// Mark every unread notification addressed directly to the user. Room notifications keep
/// their shared read flag.
pub async fn mark_all_read(db: &SqlitePool, user_id: &str) -> AppResult<u64> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1, read_at = ? WHERE receiver_id = ? AND is_read = 0")
        .bind(timestamp_now())
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

/// Reading a direct message also clears the notification it raised.
pub async fn mark_message_notifications_read(db: &SqlitePool, user_id: &str, message_ids: &[String]) -> AppResult<()> {
    let now = timestamp_now();
    for message_id in message_ids {
        sqlx::query(
            r#"UPDATE notifications SET is_read = 1, read_at = ?
               WHERE receiver_id = ? AND kind = 'message' AND subject_id = ? AND is_read = 0"#,
        )
        .bind(&now)
        .bind(user_id)
        .bind(message_id)
        .execute(db)
        .await?;
    }
    Ok(())
}
