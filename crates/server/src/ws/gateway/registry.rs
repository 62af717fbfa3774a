use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

use super::ClientId;

pub struct ConnectedClient {
    pub user_id: String,
    pub username: String,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Open connections, indexed both by connection id and by owning user.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: HashMap<ClientId, ConnectedClient>,
    by_user: HashMap<String, HashSet<ClientId>>,
}

impl ConnectionRegistry {
    pub fn register(&mut self, client_id: ClientId, client: ConnectedClient) {
        self.by_user
            .entry(client.user_id.clone())
            .or_default()
            .insert(client_id);
        self.clients.insert(client_id, client);
    }

    /// Removes the connection; the user's entry goes away with its last connection.
    pub fn unregister(&mut self, client_id: ClientId) -> Option<ConnectedClient> {
        let client = self.clients.remove(&client_id)?;
        if let Some(set) = self.by_user.get_mut(&client.user_id) {
            set.remove(&client_id);
            if set.is_empty() {
                self.by_user.remove(&client.user_id);
            }
        }
        Some(client)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ConnectedClient> {
        self.clients.get(&client_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    pub fn connections_of(&self, user_id: &str) -> Vec<ClientId> {
        self.by_user
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
