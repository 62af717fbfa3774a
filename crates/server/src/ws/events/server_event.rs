use serde::Serialize;

use crate::models::{DeleteScope, FileRef, Message, Moderation, Notification, OnlineUser, ReactionGroup};
use crate::services::delivery::DeliveryStatus;

// ── Server → Client Events ──

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Ready {
        user_id: String,
        connection_id: u64,
    },
    NewMessage {
        message: Message,
    },
    MessageUpdated {
        message: Message,
    },
    MessageContentUpdated {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        content: String,
        moderation: Moderation,
    },
    MessageStatusUpdate {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        status: DeliveryStatus,
        read_count: usize,
        recipient_count: usize,
    },
    MessageEdited {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        content: String,
        is_edited: bool,
    },
    MessageDeleted {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        scope: DeleteScope,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    ReactionUpdated {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        reactions: Vec<ReactionGroup>,
    },
    MessagesReadReceipt {
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        reader_id: String,
        message_ids: Vec<String>,
        read_at: String,
    },
    UserJoined {
        room_id: String,
        user_id: String,
        username: String,
    },
    UserLeft {
        room_id: String,
        user_id: String,
        username: String,
    },
    OnlineUsers {
        room_id: String,
        users: Vec<OnlineUser>,
        count: usize,
    },
    UserTyping {
        room_id: String,
        user_id: String,
        username: String,
    },
    UserStoppedTyping {
        room_id: String,
        user_id: String,
    },
    ChunkedMediaStart {
        message_id: String,
        room_id: String,
        sender_id: String,
        file_name: String,
        file_type: String,
        total_chunks: u32,
        file_size: u64,
    },
    ChunkedMediaChunk {
        message_id: String,
        room_id: String,
        chunk_index: u32,
        chunk: String,
        is_last_chunk: bool,
    },
    ChunkedMediaComplete {
        message_id: String,
        room_id: String,
        file_type: String,
        file: FileRef,
    },
    ChunkedMediaAbandoned {
        message_id: String,
        room_id: String,
    },
    #[serde(rename = "notification:new")]
    NotificationNew {
        notification: Notification,
    },
    #[serde(rename = "notification:sync")]
    NotificationSync {
        notifications: Vec<Notification>,
    },
    Error {
        message: String,
        code: String,
    },
    Pong,
}
