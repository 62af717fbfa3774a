use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use super::ClientId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("no transfer in progress for this message")]
    UnknownSession,
    #[error("a transfer is already in progress for this message")]
    AlreadyActive,
    #[error("transfer belongs to another user")]
    NotOwner,
    #[error("chunk index {index} out of range for {total} chunks")]
    IndexOutOfRange { index: u32, total: u32 },
    #[error("chunk {index} is marked last but the transfer has {total} chunks")]
    UnexpectedLast { index: u32, total: u32 },
    #[error("transfer exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("transfer incomplete: {received} of {total} chunks")]
    Incomplete { received: u32, total: u32 },
}

/// Declared metadata for a transfer, recorded at start.
#[derive(Debug, Clone)]
pub struct TransferMeta {
    pub message_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub owner: ClientId,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub total_chunks: u32,
    /// The message row was created by the transfer itself and goes away if it is abandoned.
    pub created_placeholder: bool,
}

#[derive(Debug)]
pub struct ChunkSession {
    pub meta: TransferMeta,
    chunks: Vec<Option<Vec<u8>>>,
    received: u32,
    bytes: u64,
    last_seen: bool,
    last_activity: Instant,
}

impl ChunkSession {
    pub fn new(meta: TransferMeta) -> Self {
        let slots = meta.total_chunks as usize;
        Self {
            meta,
            chunks: vec![None; slots],
            received: 0,
            bytes: 0,
            last_seen: false,
            last_activity: Instant::now(),
        }
    }

    /// Store chunk `index`. A repeated index replaces the earlier payload without counting twice.
    /// Accumulated bytes are bounded by both `limit` and the declared file size.
    pub fn accept(&mut self, index: u32, data: Vec<u8>, is_last: bool, limit: u64) -> Result<(), ChunkError> {
        let total = self.meta.total_chunks;
        let limit = limit.min(self.meta.file_size);
        if index >= total {
            return Err(ChunkError::IndexOutOfRange { index, total });
        }
        if is_last && index != total - 1 {
            return Err(ChunkError::UnexpectedLast { index, total });
        }

        let slot = &mut self.chunks[index as usize];
        let replaced = slot.as_ref().map(|c| c.len() as u64).unwrap_or(0);
        let bytes = self.bytes - replaced + data.len() as u64;
        if bytes > limit {
            return Err(ChunkError::TooLarge { limit });
        }

        if slot.is_none() {
            self.received += 1;
        }
        *slot = Some(data);
        self.bytes = bytes;
        self.last_seen |= is_last;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Every index has arrived and the final chunk was flagged.
    pub fn is_complete(&self) -> bool {
        self.received == self.meta.total_chunks && self.last_seen
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Concatenate chunks in index order.
    pub fn assemble(self) -> Result<Vec<u8>, ChunkError> {
        if !self.is_complete() {
            return Err(ChunkError::Incomplete {
                received: self.received,
                total: self.meta.total_chunks,
            });
        }
        let mut out = Vec::with_capacity(self.bytes as usize);
        for chunk in self.chunks.into_iter().flatten() {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

pub enum ChunkAccepted {
    Pending { received: u32, total: u32 },
    /// Removed from the store; the caller owns reassembly.
    Complete(ChunkSession),
}

#[derive(Default)]
pub struct ChunkSessionStore {
    sessions: Mutex<HashMap<String, ChunkSession>>,
}

impl ChunkSessionStore {
    pub async fn start(&self, meta: TransferMeta) -> Result<(), ChunkError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&meta.message_id) {
            return Err(ChunkError::AlreadyActive);
        }
        sessions.insert(meta.message_id.clone(), ChunkSession::new(meta));
        Ok(())
    }

    pub async fn room_of(&self, message_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .await
            .get(message_id)
            .map(|s| s.meta.room_id.clone())
    }

    pub async fn accept(
        &self,
        message_id: &str,
        sender_id: &str,
        index: u32,
        data: Vec<u8>,
        is_last: bool,
        limit: u64,
    ) -> Result<ChunkAccepted, ChunkError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(message_id)
            .ok_or(ChunkError::UnknownSession)?;
        if session.meta.sender_id != sender_id {
            return Err(ChunkError::NotOwner);
        }
        session.accept(index, data, is_last, limit)?;

        if session.is_complete() {
            let done = sessions
                .remove(message_id)
                .ok_or(ChunkError::UnknownSession)?;
            return Ok(ChunkAccepted::Complete(done));
        }
        Ok(ChunkAccepted::Pending {
            received: session.received(),
            total: session.meta.total_chunks,
        })
    }

    pub async fn remove(&self, message_id: &str) -> Option<ChunkSession> {
        self.sessions.lock().await.remove(message_id)
    }

    /// Take every session started by a connection that just closed.
    pub async fn remove_owned_by(&self, client_id: ClientId) -> Vec<ChunkSession> {
        let mut sessions = self.sessions.lock().await;
        let ids: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.meta.owner == client_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| sessions.remove(id)).collect()
    }

    pub async fn remove_idle(&self, timeout: Duration) -> Vec<ChunkSession> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let ids: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for(now) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| sessions.remove(id)).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
