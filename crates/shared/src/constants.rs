// Limits
pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_EMOJI_LENGTH: usize = 32;
pub const MAX_FILE_NAME_LENGTH: usize = 255;
pub const MAX_NOTIFICATION_TITLE_LENGTH: usize = 200;
pub const MAX_NOTIFICATION_MESSAGE_LENGTH: usize = 1000;
pub const MAX_BULK_DELETE: usize = 100;
pub const MAX_READ_BATCH: usize = 500;

pub const MESSAGE_PAGE_SIZE: i64 = 50;

// Chunked media
pub const MAX_CHUNKS_PER_TRANSFER: u32 = 10_000;

// Typing indicator expiry
pub const TYPING_TIMEOUT_MS: u64 = 3_000;

// Like/comment notifications within this window collapse into one
pub const NOTIFICATION_DEDUPE_SECS: i64 = 60;

pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";
