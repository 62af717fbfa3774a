//! Process-local realtime state.
//!
//! Everything here lives in one process and is not replicated: running several
//! server instances needs a shared presence store (pub/sub or external cache),
//! otherwise presence, typing and chunk state diverge between instances.
//!
//! Lock order when both are held: `presence` before `registry`.
//!
//! Tasks run on a multi-threaded runtime, so a room's persist-then-broadcast
//! step holds that room's `send_order` lock: broadcasts go out in stored order.

mod broadcast;
pub mod chunks;
pub mod locks;
pub mod presence;
pub mod registry;
pub mod typing;

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::models::OnlineUser;
use chunks::ChunkSessionStore;
use locks::RoomLocks;
use presence::RoomPresence;
use registry::{ConnectedClient, ConnectionRegistry};
use typing::TypingTracker;

pub type ClientId = u64;

pub struct GatewayState {
    next_id: RwLock<u64>,
    pub registry: RwLock<ConnectionRegistry>,
    pub presence: RwLock<RoomPresence>,
    pub typing: TypingTracker,
    pub chunks: ChunkSessionStore,
    /// Held from building a room message through its broadcast.
    pub send_order: RoomLocks,
    /// Serializes `active_members` write-through per room.
    pub occupancy_writes: RoomLocks,
}

/// Result of moving a connection into a room.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RoomJoin {
    /// Room the connection was switched out of.
    pub previous_room: Option<String>,
    /// The user had no connection in the room before this one.
    pub newly_present: bool,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayState {
    pub fn new() -> Self {
        Self::with_typing_timeout(Duration::from_millis(
            rally_shared::constants::TYPING_TIMEOUT_MS,
        ))
    }

    pub fn with_typing_timeout(typing_timeout: Duration) -> Self {
        Self {
            next_id: RwLock::new(1),
            registry: RwLock::new(ConnectionRegistry::default()),
            presence: RwLock::new(RoomPresence::default()),
            typing: TypingTracker::new(typing_timeout),
            chunks: ChunkSessionStore::default(),
            send_order: RoomLocks::default(),
            occupancy_writes: RoomLocks::default(),
        }
    }

    pub async fn next_client_id(&self) -> ClientId {
        let mut id = self.next_id.write().await;
        let current = *id;
        *id += 1;
        current
    }

    pub async fn register(
        &self,
        client_id: ClientId,
        user_id: String,
        username: String,
        tx: mpsc::UnboundedSender<String>,
    ) {
        let client = ConnectedClient {
            user_id,
            username,
            tx,
        };
        self.registry.write().await.register(client_id, client);
    }

    /// Drop the connection and its room presence. Returns the client and the room it was in.
    pub async fn unregister(&self, client_id: ClientId) -> Option<(ConnectedClient, Option<String>)> {
        let mut presence = self.presence.write().await;
        let mut registry = self.registry.write().await;
        let room = presence.leave_any(client_id);
        let client = registry.unregister(client_id)?;
        Some((client, room))
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.registry.read().await.is_online(user_id)
    }

    pub async fn connections_of(&self, user_id: &str) -> Vec<ClientId> {
        self.registry.read().await.connections_of(user_id)
    }

    pub async fn room_of(&self, client_id: ClientId) -> Option<String> {
        self.presence.read().await.room_of(client_id).map(str::to_string)
    }

    pub async fn join_room(&self, client_id: ClientId, room_id: &str) -> RoomJoin {
        let mut presence = self.presence.write().await;
        let registry = self.registry.read().await;
        let Some(user_id) = registry.get(client_id).map(|c| c.user_id.clone()) else {
            return RoomJoin::default();
        };
        if presence.contains(room_id, client_id) {
            return RoomJoin::default();
        }

        let newly_present = !user_in_room(&presence, &registry, room_id, &user_id);
        let previous_room = presence.join(client_id, room_id);
        RoomJoin {
            previous_room,
            newly_present,
        }
    }

    /// Returns `Some(user_gone)` when the connection left; `user_gone` is true when
    /// none of the user's connections remain in the room.
    pub async fn leave_room(&self, client_id: ClientId, room_id: &str) -> Option<bool> {
        let mut presence = self.presence.write().await;
        if !presence.leave(client_id, room_id) {
            return None;
        }
        let registry = self.registry.read().await;
        let user_id = registry.get(client_id)?.user_id.clone();
        Some(!user_in_room(&presence, &registry, room_id, &user_id))
    }

    pub async fn is_user_in_room(&self, room_id: &str, user_id: &str) -> bool {
        let presence = self.presence.read().await;
        let registry = self.registry.read().await;
        user_in_room(&presence, &registry, room_id, user_id)
    }

    /// Distinct users present in the room, ordered by username.
    pub async fn online_users(&self, room_id: &str) -> Vec<OnlineUser> {
        let presence = self.presence.read().await;
        let registry = self.registry.read().await;
        let mut seen = HashSet::new();
        let mut users: Vec<OnlineUser> = presence
            .members_of(room_id)
            .into_iter()
            .filter_map(|cid| registry.get(cid))
            .filter(|c| seen.insert(c.user_id.clone()))
            .map(|c| OnlineUser {
                user_id: c.user_id.clone(),
                username: c.username.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username).then(a.user_id.cmp(&b.user_id)));
        users
    }

    pub async fn room_occupancy(&self, room_id: &str) -> usize {
        self.online_users(room_id).await.len()
    }
}

fn user_in_room(
    presence: &RoomPresence,
    registry: &ConnectionRegistry,
    room_id: &str,
    user_id: &str,
) -> bool {
    presence
        .members_of(room_id)
        .into_iter()
        .filter_map(|cid| registry.get(cid))
        .any(|c| c.user_id == user_id)
}
