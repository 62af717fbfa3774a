mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

fn auth_header(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        format!("Bearer {}", token).parse().unwrap(),
    )
}

struct Setup {
    server: TestServer,
    pool: sqlx::SqlitePool,
    alice_id: String,
    alice_token: String,
    bob_id: String,
    bob_token: String,
}

async fn setup_with_room() -> Setup {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(pool.clone());
    let server = TestServer::new(app).unwrap();

    let (alice_id, alice_token) = common::create_test_user(&pool, "alice").await;
    let (bob_id, bob_token) = common::create_test_user(&pool, "bob").await;
    common::create_room(&pool, "room-1", &alice_id).await;
    common::add_member(&pool, "room-1", &bob_id).await;

    Setup {
        server,
        pool,
        alice_id,
        alice_token,
        bob_id,
        bob_token,
    }
}

async fn post_message(server: &TestServer, token: &str, content: &str) -> String {
    let (h, v) = auth_header(token);
    let res = server
        .post("/api/rooms/room-1/messages")
        .add_header(h, v)
        .json(&json!({"content": content}))
        .await;
    res.assert_status(StatusCode::CREATED);
    let body: Value = res.json();
    body["id"].as_str().unwrap().to_string()
}

async fn list(server: &TestServer, token: &str) -> Value {
    let (h, v) = auth_header(token);
    let res = server.get("/api/rooms/room-1/messages").add_header(h, v).await;
    res.assert_status_ok();
    res.json()
}

#[tokio::test]
async fn requests_without_session_are_401() {
    let s = setup_with_room().await;

    let res = s.server.get("/api/rooms/room-1/messages").await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = res.json();
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (h, v) = auth_header("not-a-session");
    let res = s.server.get("/api/notifications").add_header(h, v).await;
    res.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_session_is_401() {
    let s = setup_with_room().await;
    let expired = common::create_session(&s.pool, &s.alice_id, chrono::Duration::seconds(-1)).await;

    let (h, v) = auth_header(&expired);
    let res = s.server.get("/api/rooms/room-1/messages").add_header(h, v).await;
    res.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_authenticates() {
    let s = setup_with_room().await;

    let res = s
        .server
        .get("/api/rooms/room-1/messages")
        .add_header(
            HeaderName::from_static("cookie"),
            format!("theme=dark; rally.session_token={}", s.alice_token)
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .await;
    res.assert_status_ok();
}

#[tokio::test]
async fn list_messages_empty_room() {
    let s = setup_with_room().await;
    let body = list(&s.server, &s.alice_token).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["hasMore"], false);
    assert!(body["cursor"].is_null());
}

#[tokio::test]
async fn list_unknown_room_is_404() {
    let s = setup_with_room().await;
    let (h, v) = auth_header(&s.alice_token);
    let res = s.server.get("/api/rooms/nope/messages").add_header(h, v).await;
    res.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_and_list_with_status() {
    let s = setup_with_room().await;
    let id = post_message(&s.server, &s.alice_token, "hello").await;

    let body = list(&s.server, &s.alice_token).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], id);
    assert_eq!(items[0]["content"], "hello");
    assert_eq!(items[0]["type"], "text");
    assert_eq!(items[0]["status"], "sent");

    let (h, v) = auth_header(&s.bob_token);
    let res = s
        .server
        .post("/api/rooms/room-1/messages/read")
        .add_header(h, v)
        .json(&json!({"messageIds": [id]}))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["messageIds"], json!([id]));

    let body = list(&s.server, &s.alice_token).await;
    assert_eq!(body["items"][0]["status"], "read");
    assert_eq!(body["items"][0]["readBy"][0]["userId"], s.bob_id);
}

#[tokio::test]
async fn status_counts_every_member() {
    let s = setup_with_room().await;
    let (carol_id, carol_token) = common::create_test_user(&s.pool, "carol").await;
    common::add_member(&s.pool, "room-1", &carol_id).await;
    let id = post_message(&s.server, &s.alice_token, "team update").await;

    let (h, v) = auth_header(&s.bob_token);
    s.server
        .post("/api/rooms/room-1/messages/read")
        .add_header(h, v)
        .json(&json!({"messageIds": [id]}))
        .await
        .assert_status_ok();
    let body = list(&s.server, &s.alice_token).await;
    assert_eq!(body["items"][0]["status"], "delivered");

    let (h, v) = auth_header(&carol_token);
    s.server
        .post("/api/rooms/room-1/messages/read")
        .add_header(h, v)
        .json(&json!({"messageIds": [id]}))
        .await
        .assert_status_ok();
    let body = list(&s.server, &s.alice_token).await;
    assert_eq!(body["items"][0]["status"], "read");
}

#[tokio::test]
async fn list_messages_with_pagination() {
    let s = setup_with_room().await;
    for i in 0..5 {
        post_message(&s.server, &s.alice_token, &format!("msg {}", i)).await;
        // distinct millisecond timestamps
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    let (h, v) = auth_header(&s.alice_token);
    let res = s
        .server
        .get("/api/rooms/room-1/messages")
        .add_query_param("limit", 3)
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["content"], "msg 2");
    assert_eq!(items[2]["content"], "msg 4");
    assert_eq!(body["hasMore"], true);
    let cursor = body["cursor"].as_str().unwrap().to_string();

    let (h, v) = auth_header(&s.alice_token);
    let res = s
        .server
        .get("/api/rooms/room-1/messages")
        .add_query_param("limit", 3)
        .add_query_param("before", &cursor)
        .add_header(h, v)
        .await;
    let body: Value = res.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["content"], "msg 0");
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn edit_by_author_and_forbidden_for_others() {
    let s = setup_with_room().await;
    let id = post_message(&s.server, &s.alice_token, "draft").await;

    let (h, v) = auth_header(&s.alice_token);
    let res = s
        .server
        .patch(&format!("/api/messages/{}", id))
        .add_header(h, v)
        .json(&json!({"content": "final"}))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["content"], "final");
    assert_eq!(body["isEdited"], true);

    let (h, v) = auth_header(&s.bob_token);
    let res = s
        .server
        .patch(&format!("/api/messages/{}", id))
        .add_header(h, v)
        .json(&json!({"content": "hijack"}))
        .await;
    res.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_for_me_hides_only_for_caller() {
    let s = setup_with_room().await;
    let id = post_message(&s.server, &s.alice_token, "not for bob").await;

    let (h, v) = auth_header(&s.bob_token);
    s.server
        .delete(&format!("/api/messages/{}", id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let bob_view = list(&s.server, &s.bob_token).await;
    assert!(bob_view["items"].as_array().unwrap().is_empty());
    let alice_view = list(&s.server, &s.alice_token).await;
    assert_eq!(alice_view["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_for_everyone_leaves_placeholder() {
    let s = setup_with_room().await;
    let id = post_message(&s.server, &s.alice_token, "secret").await;

    let (h, v) = auth_header(&s.alice_token);
    s.server
        .delete(&format!("/api/messages/{}", id))
        .add_query_param("scope", "everyone")
        .add_header(h, v)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let body = list(&s.server, &s.bob_token).await;
    let item = &body["items"][0];
    assert_eq!(item["isDeleted"], true);
    assert_eq!(item["content"], "This message was deleted");
}

#[tokio::test]
async fn bulk_delete_removes_only_own_messages() {
    let s = setup_with_room().await;
    let mine1 = post_message(&s.server, &s.alice_token, "one").await;
    let mine2 = post_message(&s.server, &s.alice_token, "two").await;
    let theirs = post_message(&s.server, &s.bob_token, "bob's").await;

    let (h, v) = auth_header(&s.alice_token);
    let res = s
        .server
        .delete("/api/messages")
        .add_header(h, v)
        .json(&json!({"messageIds": [mine1, mine2, theirs, "missing"]}))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["deleted"], 2);

    let remaining: Vec<String> = sqlx::query_scalar("SELECT id FROM messages")
        .fetch_all(&s.pool)
        .await
        .unwrap();
    assert_eq!(remaining, vec![theirs]);

    let (h, v) = auth_header(&s.alice_token);
    s.server
        .delete("/api/messages")
        .add_header(h, v)
        .json(&json!({"messageIds": []}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reply_must_target_same_conversation() {
    let s = setup_with_room().await;
    let original = post_message(&s.server, &s.alice_token, "question").await;

    let (h, v) = auth_header(&s.bob_token);
    let res = s
        .server
        .post("/api/rooms/room-1/messages")
        .add_header(h, v)
        .json(&json!({"content": "answer", "replyTo": original}))
        .await;
    res.assert_status(StatusCode::CREATED);
    let body: Value = res.json();
    assert_eq!(body["replyTo"], original);

    let (h, v) = auth_header(&s.bob_token);
    s.server
        .post("/api/rooms/room-1/messages")
        .add_header(h, v)
        .json(&json!({"content": "answer", "replyTo": "missing"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn online_users_endpoint() {
    let s = setup_with_room().await;
    let (h, v) = auth_header(&s.alice_token);
    let res = s.server.get("/api/rooms/room-1/online").add_header(h, v).await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["count"], 0);

    let (h, v) = auth_header(&s.alice_token);
    s.server
        .get("/api/rooms/nope/online")
        .add_header(h, v)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_conversation_over_rest() {
    let s = setup_with_room().await;

    let (h, v) = auth_header(&s.alice_token);
    let res = s
        .server
        .post(&format!("/api/dms/{}/messages", s.bob_id))
        .add_header(h, v)
        .json(&json!({"content": "psst"}))
        .await;
    res.assert_status(StatusCode::CREATED);
    let sent: Value = res.json();
    assert_eq!(sent["receiverId"], s.bob_id);

    let (h, v) = auth_header(&s.bob_token);
    let res = s
        .server
        .get(&format!("/api/dms/{}/messages", s.alice_id))
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["content"], "psst");

    let (h, v) = auth_header(&s.alice_token);
    s.server
        .post("/api/dms/nobody/messages")
        .add_header(h, v)
        .json(&json!({"content": "hi"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_file_is_404() {
    let s = setup_with_room().await;
    s.server
        .get("/api/files/abc123/missing.png")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
