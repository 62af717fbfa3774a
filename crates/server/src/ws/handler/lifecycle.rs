use crate::error::error_event;
use crate::models::AuthUser;
use crate::services::{notifications, presence};
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// `ready` first, then the unread notification batch.
pub async fn send_initial_state(state: &AppState, client_id: ClientId, user: &AuthUser) {
    state
        .gateway
        .send_to(
            client_id,
            &ServerEvent::Ready {
                user_id: user.id.clone(),
                connection_id: client_id,
            },
        )
        .await;

    if let Err(e) = notifications::resync(state, &user.id, client_id).await {
        tracing::warn!(user_id = %user.id, error = %e, "notification resync failed");
        state.gateway.send_to(client_id, &error_event(&e)).await;
    }
}

pub async fn handle_disconnect(state: &AppState, client_id: ClientId) {
    presence::disconnect(state, client_id).await;
}
