mod server_event;

pub use server_event::ServerEvent;

use serde::Deserialize;

use crate::models::{DeleteScope, FileRef, MessageType};

// ── Client → Server Events ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    SendMessage {
        room_id: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        message_type: MessageType,
        #[serde(default)]
        reply_to: Option<String>,
        #[serde(default, alias = "fileRef")]
        file: Option<FileRef>,
    },
    TypingStart {
        room_id: String,
    },
    TypingStop {
        room_id: String,
    },
    MessagesRead {
        room_id: String,
        message_ids: Vec<String>,
    },
    DirectMessagesRead {
        peer_id: String,
        message_ids: Vec<String>,
    },
    DeleteMessage {
        message_id: String,
        #[serde(default)]
        room_id: Option<String>,
        scope: DeleteScope,
    },
    EditMessage {
        message_id: String,
        #[serde(default)]
        room_id: Option<String>,
        #[serde(alias = "newContent")]
        content: String,
    },
    AddReaction {
        message_id: String,
        #[serde(default)]
        room_id: Option<String>,
        emoji: String,
    },
    SendDirectMessage {
        receiver_id: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        message_type: MessageType,
        #[serde(default)]
        reply_to: Option<String>,
        #[serde(default, alias = "fileRef")]
        file: Option<FileRef>,
    },
    ChunkedMediaStart {
        message_id: String,
        file_name: String,
        file_type: String,
        total_chunks: u32,
        file_size: u64,
        room_id: String,
    },
    ChunkedMediaChunk {
        message_id: String,
        chunk_index: u32,
        chunk: String,
        #[serde(default)]
        is_last_chunk: bool,
    },
    Ping,
}
