use crate::constants::*;

pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message content is required".into());
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> Result<(), String> {
    let trimmed = emoji.trim();
    if trimmed.is_empty() {
        return Err("Emoji is required".into());
    }
    if trimmed.len() > MAX_EMOJI_LENGTH || trimmed.chars().any(char::is_whitespace) {
        return Err("Invalid emoji".into());
    }
    Ok(())
}

pub fn validate_file_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("File name is required".into());
    }
    if trimmed.len() > MAX_FILE_NAME_LENGTH {
        return Err(format!(
            "File name must be at most {} characters",
            MAX_FILE_NAME_LENGTH
        ));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed == "." || trimmed == ".." {
        return Err("File name cannot contain path separators".into());
    }
    Ok(())
}

pub fn validate_chunk_count(total_chunks: u32) -> Result<(), String> {
    if total_chunks == 0 {
        return Err("Transfer must have at least one chunk".into());
    }
    if total_chunks > MAX_CHUNKS_PER_TRANSFER {
        return Err(format!(
            "Transfer must have at most {} chunks",
            MAX_CHUNKS_PER_TRANSFER
        ));
    }
    Ok(())
}

pub fn validate_notification_text(title: &str, message: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Notification title is required".into());
    }
    if title.chars().count() > MAX_NOTIFICATION_TITLE_LENGTH {
        return Err("Notification title too long".into());
    }
    if message.chars().count() > MAX_NOTIFICATION_MESSAGE_LENGTH {
        return Err("Notification message too long".into());
    }
    Ok(())
}
