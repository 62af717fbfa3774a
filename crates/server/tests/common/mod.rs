#![allow(dead_code)]

pub mod ws_helpers;

use axum::Router;
use chrono::{Duration, SecondsFormat, Utc};
use rally_server::config::Config;
use rally_server::moderation::NoopClassifier;
use rally_server::{db, routes, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Create an in-memory SQLite pool with the schema applied.
/// One connection, so every query sees the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    db::apply_schema(&pool).await.unwrap();
    pool
}

pub fn test_config() -> Config {
    let upload_dir = std::env::temp_dir().join(format!("rally-test-{}", uuid::Uuid::new_v4()));
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        upload_dir: upload_dir.to_string_lossy().into_owned(),
        max_upload_bytes: 1024 * 1024,
        typing_timeout_ms: 300,
        ..Config::default()
    }
}

pub fn create_test_state(pool: SqlitePool) -> Arc<AppState> {
    create_test_state_with(pool, test_config())
}

pub fn create_test_state_with(pool: SqlitePool, config: Config) -> Arc<AppState> {
    Arc::new(AppState::with_classifier(pool, config, Arc::new(NoopClassifier)))
}

/// Build the full app router with test state.
pub fn create_test_app(pool: SqlitePool) -> Router {
    routes::build_router(create_test_state(pool))
}

fn rfc3339(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Insert a user with a live session. Returns (user_id, token).
pub async fn create_test_user(pool: &SqlitePool, username: &str) -> (String, String) {
    let user_id = uuid::Uuid::new_v4().to_string();
    let now = rfc3339(Utc::now());

    sqlx::query(r#"INSERT INTO "user" (id, username, created_at) VALUES (?, ?, ?)"#)
        .bind(&user_id)
        .bind(username)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

    let token = create_session(pool, &user_id, Duration::days(7)).await;
    (user_id, token)
}

/// Session that expires `ttl` from now; a negative ttl gives an expired one.
pub async fn create_session(pool: &SqlitePool, user_id: &str, ttl: Duration) -> String {
    let token = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO "session" (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&token)
    .bind(rfc3339(Utc::now() + ttl))
    .bind(rfc3339(Utc::now()))
    .execute(pool)
    .await
    .unwrap();
    token
}

/// Create a community (room) owned by `owner_id`, with the owner as its first member.
pub async fn create_room(pool: &SqlitePool, room_id: &str, owner_id: &str) {
    sqlx::query("INSERT INTO communities (id, name, owner_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(room_id)
        .bind(format!("Room {}", room_id))
        .bind(owner_id)
        .bind(rfc3339(Utc::now()))
        .execute(pool)
        .await
        .unwrap();

    add_member(pool, room_id, owner_id).await;
}

pub async fn add_member(pool: &SqlitePool, room_id: &str, user_id: &str) {
    sqlx::query("INSERT INTO community_members (community_id, user_id, joined_at) VALUES (?, ?, ?)")
        .bind(room_id)
        .bind(user_id)
        .bind(rfc3339(Utc::now()))
        .execute(pool)
        .await
        .unwrap();
}

pub async fn active_members(pool: &SqlitePool, room_id: &str) -> i64 {
    sqlx::query_scalar("SELECT active_members FROM communities WHERE id = ?")
        .bind(room_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Poll until `check` holds, for state written by background tasks.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}
