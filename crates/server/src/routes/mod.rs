pub mod dms;
pub mod files;
pub mod messages;
pub mod notifications;
pub mod rooms;

use crate::ws;
use crate::AppState;
use axum::{routing::{delete, get, patch, post}, Router};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Rooms
        .route("/rooms/{roomId}/messages", get(rooms::list_messages))
        .route("/rooms/{roomId}/messages", post(rooms::send_message))
        .route("/rooms/{roomId}/messages/read", post(rooms::mark_read))
        .route("/rooms/{roomId}/online", get(rooms::online_users))
        // Messages
        .route("/messages", delete(messages::bulk_delete))
        .route("/messages/{messageId}", patch(messages::edit_message))
        .route("/messages/{messageId}", delete(messages::delete_message))
        // Direct messages
        .route("/dms/{userId}/messages", get(dms::list_messages))
        .route("/dms/{userId}/messages", post(dms::send_message))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications", post(notifications::create))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        // Files
        .route("/files/{id}/{fileName}", get(files::serve_file));

    Router::new()
        .nest("/api", api_routes)
        .route("/gateway", get(ws::handler::ws_handler))
        .with_state(state)
}
