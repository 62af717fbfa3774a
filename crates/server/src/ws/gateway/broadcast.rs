use super::{ClientId, GatewayState};
use crate::ws::events::ServerEvent;

fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode server event");
            None
        }
    }
}

// A closed receiver means the connection is going away; it is skipped, not retried.

impl GatewayState {
    /// Push to every connection present in the room. Returns the number of frames queued.
    pub async fn broadcast_room(&self, room_id: &str, event: &ServerEvent, exclude: Option<ClientId>) -> usize {
        let Some(msg) = encode(event) else {
            return 0;
        };

        let presence = self.presence.read().await;
        let registry = self.registry.read().await;

        let mut sent = 0;
        for cid in presence.members_of(room_id) {
            if Some(cid) == exclude {
                continue;
            }
            if let Some(client) = registry.get(cid) {
                if client.tx.send(msg.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Room broadcast that skips every connection of `user_id`.
    pub async fn broadcast_room_except_user(&self, room_id: &str, event: &ServerEvent, user_id: &str) -> usize {
        let Some(msg) = encode(event) else {
            return 0;
        };

        let presence = self.presence.read().await;
        let registry = self.registry.read().await;

        let mut sent = 0;
        for cid in presence.members_of(room_id) {
            if let Some(client) = registry.get(cid) {
                if client.user_id != user_id && client.tx.send(msg.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    pub async fn send_to(&self, client_id: ClientId, event: &ServerEvent) -> bool {
        let Some(msg) = encode(event) else {
            return false;
        };

        let registry = self.registry.read().await;
        registry
            .get(client_id)
            .is_some_and(|client| client.tx.send(msg).is_ok())
    }

    /// Push to all of a user's connections, optionally skipping the originating one.
    pub async fn send_to_user(&self, user_id: &str, event: &ServerEvent, exclude: Option<ClientId>) -> usize {
        let Some(msg) = encode(event) else {
            return 0;
        };

        let registry = self.registry.read().await;
        let mut sent = 0;
        for cid in registry.connections_of(user_id) {
            if Some(cid) == exclude {
                continue;
            }
            if let Some(client) = registry.get(cid) {
                if client.tx.send(msg.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Push once to each distinct user's connections.
    pub async fn send_to_users(&self, user_ids: &[&str], event: &ServerEvent) -> usize {
        let Some(msg) = encode(event) else {
            return 0;
        };

        let registry = self.registry.read().await;
        let mut seen = std::collections::HashSet::new();
        let mut sent = 0;
        for user_id in user_ids {
            if !seen.insert(*user_id) {
                continue;
            }
            for cid in registry.connections_of(user_id) {
                if let Some(client) = registry.get(cid) {
                    if client.tx.send(msg.clone()).is_ok() {
                        sent += 1;
                    }
                }
            }
        }
        sent
    }
}
