use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl MessageType {
    /// Pick the message type for a declared MIME type such as `image/png`.
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or_default() {
            "image" => MessageType::Image,
            "video" => MessageType::Video,
            "audio" => MessageType::Audio,
            _ => MessageType::File,
        }
    }

    pub fn is_media(self) -> bool {
        self != MessageType::Text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Annotation attached by the content classifier after the message was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moderation {
    pub category: String,
    pub flagged: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub room_id: Option<String>,
    pub receiver_id: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub file_duration: Option<f64>,
    pub reply_to: Option<String>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub moderation: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    pub fn file(&self) -> Option<FileRef> {
        let url = self.file_url.clone()?;
        Some(FileRef {
            url,
            name: self.file_name.clone().unwrap_or_default(),
            size: self.file_size,
            duration: self.file_duration,
        })
    }

    /// The other side of a direct conversation, seen from `user_id`.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        let receiver = self.receiver_id.as_deref()?;
        if self.sender_id == user_id {
            Some(receiver)
        } else {
            Some(self.sender_id.as_str())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: String,
    pub read_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub emoji: String,
    pub user_ids: Vec<String>,
}

/// Fully populated message as pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub is_edited: bool,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation: Option<Moderation>,
    pub created_at: String,
    pub read_by: Vec<ReadReceipt>,
    pub reactions: Vec<ReactionGroup>,
}

impl Message {
    pub fn from_row(row: MessageRow, read_by: Vec<ReadReceipt>, reactions: Vec<ReactionGroup>) -> Self {
        let file = row.file();
        let moderation = row
            .moderation
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok());
        Self {
            id: row.id,
            sender_id: row.sender_id,
            room_id: row.room_id,
            receiver_id: row.receiver_id,
            content: row.content,
            message_type: row.message_type,
            file,
            reply_to: row.reply_to,
            is_edited: row.is_edited,
            is_deleted: row.is_deleted,
            moderation,
            created_at: row.created_at,
            read_by,
            reactions,
        }
    }
}

/// Client-supplied part of a new message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default, alias = "fileRef")]
    pub file: Option<FileRef>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteScope {
    Me,
    Everyone,
}

/// Group `(emoji, user_id)` rows, preserving first-seen emoji order.
pub fn group_reactions(rows: Vec<(String, String)>) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for (emoji, user_id) in rows {
        match groups.iter_mut().find(|g| g.emoji == emoji) {
            Some(group) => group.user_ids.push(user_id),
            None => groups.push(ReactionGroup {
                emoji,
                user_ids: vec![user_id],
            }),
        }
    }
    groups
}
