#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use rally_server::moderation::{ContentClassifier, NoopClassifier};
use rally_server::AppState;
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the test app on a random TCP port and return the base URL.
pub async fn start_server() -> (String, sqlx::SqlitePool, Arc<AppState>) {
    start_server_with(Arc::new(NoopClassifier)).await
}

/// Same as [`start_server`], with the given content classifier.
pub async fn start_server_with(
    classifier: Arc<dyn ContentClassifier>,
) -> (String, sqlx::SqlitePool, Arc<AppState>) {
    let pool = super::setup_test_db().await;
    let state = Arc::new(AppState::with_classifier(pool.clone(), super::test_config(), classifier));
    let app = rally_server::routes::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (base, pool, state)
}

fn gateway_url(base: &str, token: &str) -> String {
    format!("{}/gateway?token={}", base.replace("http://", "ws://"), token)
}

/// Connect a WebSocket with a session token.
pub async fn ws_connect(base: &str, token: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(&gateway_url(base, token))
        .await
        .unwrap();
    ws
}

/// Connect and consume the `ready` and `notification:sync` frames sent on connect.
/// Returns the socket and the synced notifications.
pub async fn ws_connect_ready(base: &str, token: &str) -> (WsStream, Vec<Value>) {
    let mut ws = ws_connect(base, token).await;
    let ready = recv_json(&mut ws).await.unwrap();
    assert_eq!(ready["type"], "ready");
    let sync = recv_json(&mut ws).await.unwrap();
    assert_eq!(sync["type"], "notification:sync");
    let notifications = sync["notifications"].as_array().cloned().unwrap_or_default();
    (ws, notifications)
}

/// Attempt a connection that is expected to be refused before upgrade.
pub async fn ws_connect_status(base: &str, token: &str) -> Option<u16> {
    match tokio_tungstenite::connect_async(&gateway_url(base, token)).await {
        Ok(_) => None,
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => Some(response.status().as_u16()),
        Err(_) => Some(0),
    }
}

/// Read next text message parsed as JSON, with timeout.
pub async fn recv_json(ws: &mut WsStream) -> Option<Value> {
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(3), ws.next()).await;
    match timeout {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

/// Skip frames until one of the given type arrives.
pub async fn recv_type(ws: &mut WsStream, event_type: &str) -> Option<Value> {
    loop {
        let msg = recv_json(ws).await?;
        if msg["type"] == event_type {
            return Some(msg);
        }
    }
}

/// Drain all pending messages until timeout.
pub async fn drain_messages(ws: &mut WsStream) -> Vec<Value> {
    let mut messages = Vec::new();
    loop {
        let timeout =
            tokio::time::timeout(std::time::Duration::from_millis(200), ws.next()).await;
        match timeout {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(v) = serde_json::from_str::<Value>(&text) {
                    messages.push(v);
                }
            }
            _ => break,
        }
    }
    messages
}

pub fn of_type<'a>(messages: &'a [Value], event_type: &str) -> Vec<&'a Value> {
    messages.iter().filter(|m| m["type"] == event_type).collect()
}

/// Send a JSON message over WebSocket.
pub async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(serde_json::to_string(value).unwrap().into()))
        .await
        .unwrap();
}

pub async fn join_room(ws: &mut WsStream, room_id: &str) {
    send_json(ws, &serde_json::json!({"type": "join_room", "roomId": room_id})).await;
}
