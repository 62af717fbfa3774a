mod chat;
mod direct;
mod lifecycle;
mod media;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{error_event, AppError, AppResult};
use crate::middleware::auth::{token_from_headers, verify_token};
use crate::models::AuthUser;
use crate::services::presence;
use crate::ws::events::{ClientEvent, ServerEvent};
use crate::ws::gateway::ClientId;
use crate::AppState;

/// WebSocket upgrade handler. The session is verified before the upgrade, so a
/// rejected handshake never creates connection state.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .get("token")
        .filter(|t| !t.is_empty())
        .cloned()
        .or_else(|| token_from_headers(&headers))
        .ok_or(AppError::Unauthenticated)?;
    let user = verify_token(&state.db, &token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let client_id = state.gateway.next_client_id().await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state
        .gateway
        .register(client_id, user.id.clone(), user.username.clone(), tx)
        .await;
    tracing::info!(user_id = %user.id, connection_id = client_id, "connection opened");

    lifecycle::send_initial_state(&state, client_id, &user).await;

    // Forward queued frames from the gateway to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Events from one connection are handled in arrival order
    let recv_state = state.clone();
    let recv_user = user.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let text_str: &str = &text;
                    match serde_json::from_str::<ClientEvent>(text_str) {
                        Ok(event) => dispatch(&recv_state, client_id, &recv_user, event).await,
                        Err(e) => {
                            let err = AppError::BadRequest(format!("Malformed event: {}", e));
                            recv_state.gateway.send_to(client_id, &error_event(&err)).await;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    lifecycle::handle_disconnect(&state, client_id).await;
}

/// Run one event; a rejected operation only ever reaches the originating connection.
async fn dispatch(state: &Arc<AppState>, client_id: ClientId, user: &AuthUser, event: ClientEvent) {
    if let Err(e) = handle_client_event(state, client_id, user, event).await {
        state.gateway.send_to(client_id, &error_event(&e)).await;
    }
}

async fn handle_client_event(
    state: &Arc<AppState>,
    client_id: ClientId,
    user: &AuthUser,
    event: ClientEvent,
) -> AppResult<()> {
    match event {
        ClientEvent::JoinRoom { room_id } => presence::join_room(state, client_id, user, &room_id).await,
        ClientEvent::LeaveRoom { room_id } => {
            presence::leave_room(state, client_id, user, &room_id).await;
            Ok(())
        }
        ClientEvent::SendMessage { room_id, content, message_type, reply_to, file } => {
            chat::handle_send_message(state, user, room_id, content, message_type, reply_to, file).await
        }
        ClientEvent::TypingStart { room_id } => chat::handle_typing_start(state, client_id, user, room_id).await,
        ClientEvent::TypingStop { room_id } => {
            chat::handle_typing_stop(state, user, &room_id).await;
            Ok(())
        }
        ClientEvent::MessagesRead { room_id, message_ids } => {
            chat::handle_messages_read(state, user, room_id, message_ids).await
        }
        ClientEvent::DeleteMessage { message_id, room_id, scope } => {
            chat::handle_delete_message(state, client_id, user, message_id, room_id, scope).await
        }
        ClientEvent::EditMessage { message_id, room_id, content } => {
            chat::handle_edit_message(state, user, message_id, room_id, content).await
        }
        ClientEvent::AddReaction { message_id, room_id, emoji } => {
            chat::handle_add_reaction(state, user, message_id, room_id, emoji).await
        }
        ClientEvent::SendDirectMessage { receiver_id, content, message_type, reply_to, file } => {
            direct::handle_send_direct(state, user, receiver_id, content, message_type, reply_to, file).await
        }
        ClientEvent::DirectMessagesRead { peer_id, message_ids } => {
            direct::handle_direct_read(state, user, peer_id, message_ids).await
        }
        ClientEvent::ChunkedMediaStart { message_id, file_name, file_type, total_chunks, file_size, room_id } => {
            media::handle_start(state, client_id, user, message_id, room_id, file_name, file_type, total_chunks, file_size)
                .await
        }
        ClientEvent::ChunkedMediaChunk { message_id, chunk_index, chunk, is_last_chunk } => {
            media::handle_chunk(state, client_id, user, message_id, chunk_index, chunk, is_last_chunk).await
        }
        ClientEvent::Ping => {
            state.gateway.send_to(client_id, &ServerEvent::Pong).await;
            Ok(())
        }
    }
}
