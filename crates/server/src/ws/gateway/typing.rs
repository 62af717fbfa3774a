use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{ClientId, GatewayState};
use crate::ws::events::ServerEvent;

type TypingKey = (String, String);

struct TypingEntry {
    generation: u64,
    timer: JoinHandle<()>,
}

/// Self-expiring "is typing" flags keyed by (room, user).
pub struct TypingTracker {
    timeout: Duration,
    entries: Mutex<HashMap<TypingKey, TypingEntry>>,
    generation: AtomicU64,
}

impl TypingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn is_typing(&self, room_id: &str, user_id: &str) -> bool {
        self.entries
            .lock()
            .await
            .contains_key(&(room_id.to_string(), user_id.to_string()))
    }
}

impl GatewayState {
    /// Mark the user as typing and (re)arm the expiry timer.
    pub async fn typing_start(
        self: &Arc<Self>,
        room_id: &str,
        user_id: &str,
        username: &str,
        origin: Option<ClientId>,
    ) {
        let key = (room_id.to_string(), user_id.to_string());
        let generation = self.typing.generation.fetch_add(1, Ordering::Relaxed);
        let timeout = self.typing.timeout;

        {
            // Held across spawn so the timer can't observe the map before its entry is in.
            let mut entries = self.typing.entries.lock().await;
            let gw = Arc::clone(self);
            let timer_key = key.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                gw.typing_expire(timer_key, generation).await;
            });
            if let Some(previous) = entries.insert(key, TypingEntry { generation, timer }) {
                previous.timer.abort();
            }
        }

        tracing::debug!(room_id = %room_id, user_id = %user_id, "typing started");
        self.broadcast_room(
            room_id,
            &ServerEvent::UserTyping {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
            origin,
        )
        .await;
    }

    /// Cancel the flag now. Returns false (and emits nothing) when the user wasn't typing.
    pub async fn typing_stop(&self, room_id: &str, user_id: &str) -> bool {
        let removed = self
            .typing
            .entries
            .lock()
            .await
            .remove(&(room_id.to_string(), user_id.to_string()));

        let Some(entry) = removed else {
            return false;
        };
        entry.timer.abort();
        self.emit_stopped_typing(room_id, user_id).await;
        true
    }

    async fn typing_expire(&self, key: TypingKey, generation: u64) {
        {
            let mut entries = self.typing.entries.lock().await;
            match entries.get(&key) {
                Some(entry) if entry.generation == generation => {
                    entries.remove(&key);
                }
                _ => return,
            }
        }
        tracing::debug!(room_id = %key.0, user_id = %key.1, "typing expired");
        self.emit_stopped_typing(&key.0, &key.1).await;
    }

    async fn emit_stopped_typing(&self, room_id: &str, user_id: &str) {
        self.broadcast_room(
            room_id,
            &ServerEvent::UserStoppedTyping {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            },
            None,
        )
        .await;
    }
}
