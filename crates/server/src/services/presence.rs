use std::sync::Arc;

use super::media;
use super::messages::fetch_room;
use crate::error::AppResult;
use crate::models::{AuthUser, OnlineUser};
use crate::tasks::spawn_background;
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// Move the connection into `room_id`, leaving whatever room it was in.
pub async fn join_room(state: &AppState, client_id: ClientId, user: &AuthUser, room_id: &str) -> AppResult<()> {
    fetch_room(&state.db, room_id).await?;

    let join = state.gateway.join_room(client_id, room_id).await;
    if let Some(previous) = join.previous_room.as_deref() {
        let gone = !state.gateway.is_user_in_room(previous, &user.id).await;
        announce_departure(state, previous, &user.id, &user.username, gone).await;
    }

    if join.newly_present {
        tracing::debug!(room_id = %room_id, user_id = %user.id, "user joined room");
        state
            .gateway
            .broadcast_room(
                room_id,
                &ServerEvent::UserJoined {
                    room_id: room_id.to_string(),
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                },
                None,
            )
            .await;
    }

    broadcast_online_users(state, room_id).await;
    sync_active_members(state, room_id);
    Ok(())
}

/// Leaving a room the connection isn't in is a no-op.
pub async fn leave_room(state: &AppState, client_id: ClientId, user: &AuthUser, room_id: &str) {
    if let Some(gone) = state.gateway.leave_room(client_id, room_id).await {
        announce_departure(state, room_id, &user.id, &user.username, gone).await;
    }
}

/// Tell the room a connection left. `user_gone` is false while another of the
/// user's connections is still present, in which case only the list is refreshed.
pub async fn announce_departure(state: &AppState, room_id: &str, user_id: &str, username: &str, user_gone: bool) {
    if user_gone {
        tracing::debug!(room_id = %room_id, user_id = %user_id, "user left room");
        state.gateway.typing_stop(room_id, user_id).await;
        state
            .gateway
            .broadcast_room(
                room_id,
                &ServerEvent::UserLeft {
                    room_id: room_id.to_string(),
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                },
                None,
            )
            .await;
    }
    broadcast_online_users(state, room_id).await;
    sync_active_members(state, room_id);
}

pub async fn online_users(state: &AppState, room_id: &str) -> AppResult<Vec<OnlineUser>> {
    fetch_room(&state.db, room_id).await?;
    Ok(state.gateway.online_users(room_id).await)
}

async fn broadcast_online_users(state: &AppState, room_id: &str) {
    let users = state.gateway.online_users(room_id).await;
    let count = users.len();
    state
        .gateway
        .broadcast_room(
            room_id,
            &ServerEvent::OnlineUsers {
                room_id: room_id.to_string(),
                users,
                count,
            },
            None,
        )
        .await;
}

/// Write the room's occupancy through to `communities.active_members`, off the request path.
/// Writes for a room run one at a time and each reads the count under the lock,
/// so the last one to run stores the current occupancy.
pub fn sync_active_members(state: &AppState, room_id: &str) {
    let db = state.db.clone();
    let gateway = Arc::clone(&state.gateway);
    let room_id = room_id.to_string();
    spawn_background("sync_active_members", async move {
        let _write = gateway.occupancy_writes.lock(&room_id).await;
        let count = gateway.room_occupancy(&room_id).await as i64;
        sqlx::query("UPDATE communities SET active_members = ? WHERE id = ?")
            .bind(count)
            .bind(&room_id)
            .execute(&db)
            .await
            .map(|_| ())
    });
}

/// Tear down everything a closed connection owned.
pub async fn disconnect(state: &AppState, client_id: ClientId) {
    let Some((client, room)) = state.gateway.unregister(client_id).await else {
        return;
    };

    if let Some(room_id) = room {
        let gone = !state.gateway.is_user_in_room(&room_id, &client.user_id).await;
        announce_departure(state, &room_id, &client.user_id, &client.username, gone).await;
    }

    let abandoned = media::abandon_for_connection(state, client_id).await;
    tracing::info!(
        user_id = %client.user_id,
        connection_id = client_id,
        abandoned_transfers = abandoned,
        "connection closed"
    );
}
