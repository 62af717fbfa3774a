use std::collections::{HashMap, HashSet};

use super::ClientId;

/// Which connections are inside which room. A connection is in at most one room.
#[derive(Default)]
pub struct RoomPresence {
    rooms: HashMap<String, HashSet<ClientId>>,
    current: HashMap<ClientId, String>,
}

impl RoomPresence {
    /// Place the connection in `room_id`, returning the room it was switched out of.
    pub fn join(&mut self, client_id: ClientId, room_id: &str) -> Option<String> {
        let previous = match self.current.get(&client_id) {
            Some(room) if room == room_id => return None,
            Some(_) => self.leave_any(client_id),
            None => None,
        };

        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(client_id);
        self.current.insert(client_id, room_id.to_string());
        previous
    }

    /// Returns false when the connection was not in `room_id`.
    pub fn leave(&mut self, client_id: ClientId, room_id: &str) -> bool {
        if self.current.get(&client_id).map(String::as_str) != Some(room_id) {
            return false;
        }
        self.leave_any(client_id).is_some()
    }

    pub fn leave_any(&mut self, client_id: ClientId) -> Option<String> {
        let room_id = self.current.remove(&client_id)?;
        if let Some(set) = self.rooms.get_mut(&room_id) {
            set.remove(&client_id);
            if set.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
        Some(room_id)
    }

    pub fn room_of(&self, client_id: ClientId) -> Option<&str> {
        self.current.get(&client_id).map(String::as_str)
    }

    pub fn members_of(&self, room_id: &str) -> Vec<ClientId> {
        self.rooms
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room_id: &str, client_id: ClientId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|set| set.contains(&client_id))
    }
}
