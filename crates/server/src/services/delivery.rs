use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::error::AppResult;
use crate::models::MessageRow;

/// Per-message delivery state as seen by the sender.
///
/// There is no receive-ack channel: a message only moves past `Sent` once a
/// recipient sends a read receipt, so `Delivered` means "read by some".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySnapshot {
    pub status: DeliveryStatus,
    pub read_count: usize,
    pub recipient_count: usize,
}

/// Status from the recipients (room members or the direct peer) and the readers.
/// The sender is excluded from both sides, and only readers who are recipients count.
pub fn compute_status<'a, R, D>(sender_id: &str, recipients: R, readers: D) -> DeliverySnapshot
where
    R: IntoIterator<Item = &'a str>,
    D: IntoIterator<Item = &'a str>,
{
    let recipients: HashSet<&str> = recipients.into_iter().filter(|u| *u != sender_id).collect();
    let read_count = readers
        .into_iter()
        .filter(|u| recipients.contains(u))
        .collect::<HashSet<&str>>()
        .len();
    let recipient_count = recipients.len();

    let status = if recipient_count > 0 && read_count >= recipient_count {
        DeliveryStatus::Read
    } else if read_count > 0 {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Sent
    };

    DeliverySnapshot {
        status,
        read_count,
        recipient_count,
    }
}

/// Load membership and read receipts for a stored message and compute its status.
pub async fn message_delivery(db: &SqlitePool, message: &MessageRow) -> AppResult<DeliverySnapshot> {
    let recipients: Vec<String> = match (&message.room_id, &message.receiver_id) {
        (Some(room_id), _) => {
            sqlx::query_scalar("SELECT user_id FROM community_members WHERE community_id = ?")
                .bind(room_id)
                .fetch_all(db)
                .await?
        }
        (None, Some(receiver_id)) => vec![receiver_id.clone()],
        (None, None) => Vec::new(),
    };

    let readers: Vec<String> = sqlx::query_scalar("SELECT user_id FROM message_reads WHERE message_id = ?")
        .bind(&message.id)
        .fetch_all(db)
        .await?;

    Ok(compute_status(
        &message.sender_id,
        recipients.iter().map(String::as_str),
        readers.iter().map(String::as_str),
    ))
}
