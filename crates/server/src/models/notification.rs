use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Mention,
    Message,
    Tournament,
    Admin,
    System,
}

impl NotificationKind {
    /// Kinds where a burst from the same sender collapses into one unread entry.
    pub fn dedupes(self) -> bool {
        matches!(self, NotificationKind::Like | NotificationKind::Comment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    User(String),
    Room(String),
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub room_id: Option<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub subject_id: Option<String>,
    pub payload: String,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

impl Notification {
    pub fn target(&self) -> NotificationTarget {
        match (&self.receiver_id, &self.room_id) {
            (Some(user), _) => NotificationTarget::User(user.clone()),
            (None, Some(room)) => NotificationTarget::Room(room.clone()),
            // the table CHECK rules out rows with neither
            (None, None) => NotificationTarget::User(self.sender_id.clone()),
        }
    }
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        let payload = serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null);
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            room_id: row.room_id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            subject_id: row.subject_id,
            payload,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

/// Domain event asking for a notification. The sender is always the acting user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewNotification {
    pub fn to_user(receiver_id: impl Into<String>, kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            receiver_id: Some(receiver_id.into()),
            room_id: None,
            kind,
            title: title.into(),
            message: message.into(),
            subject_id: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Exactly one of receiver and room must be set.
    pub fn target(&self) -> Option<NotificationTarget> {
        match (&self.receiver_id, &self.room_id) {
            (Some(user), None) => Some(NotificationTarget::User(user.clone())),
            (None, Some(room)) => Some(NotificationTarget::Room(room.clone())),
            _ => None,
        }
    }
}
