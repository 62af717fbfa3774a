mod common;

use common::ws_helpers::*;
use serde_json::json;

async fn setup() -> (String, sqlx::SqlitePool, (String, String), (String, String)) {
    let (base, pool, _state) = start_server().await;
    let alice = common::create_test_user(&pool, "alice").await;
    let bob = common::create_test_user(&pool, "bob").await;
    common::create_room(&pool, "room-1", &alice.0).await;
    common::create_room(&pool, "room-2", &alice.0).await;
    common::add_member(&pool, "room-1", &bob.0).await;
    (base, pool, alice, bob)
}

async fn join_and_settle(ws: &mut WsStream, room_id: &str) {
    join_room(ws, room_id).await;
    recv_type(ws, "online_users").await.unwrap();
}

#[tokio::test]
async fn join_announces_user_and_online_list() {
    let (base, pool, (alice_id, alice_token), (bob_id, bob_token)) = setup().await;

    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;
    join_room(&mut a, "room-1").await;
    let joined = recv_type(&mut a, "user_joined").await.unwrap();
    assert_eq!(joined["userId"], alice_id);
    let online = recv_type(&mut a, "online_users").await.unwrap();
    assert_eq!(online["count"], 1);

    let (mut b, _) = ws_connect_ready(&base, &bob_token).await;
    join_and_settle(&mut b, "room-1").await;

    let joined = recv_type(&mut a, "user_joined").await.unwrap();
    assert_eq!(joined["userId"], bob_id);
    assert_eq!(joined["username"], "bob");
    let online = recv_type(&mut a, "online_users").await.unwrap();
    assert_eq!(online["roomId"], "room-1");
    assert_eq!(online["count"], 2);
    let names: Vec<&str> = online["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "bob"]);

    assert!(
        common::eventually(|| async { common::active_members(&pool, "room-1").await == 2 }).await
    );
}

#[tokio::test]
async fn joining_unknown_room_is_not_found() {
    let (base, _pool, (_, alice_token), _) = setup().await;
    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;

    join_room(&mut a, "missing").await;
    let err = recv_type(&mut a, "error").await.unwrap();
    assert_eq!(err["code"], "NOT_FOUND");
}

#[tokio::test]
async fn second_device_does_not_rejoin_user() {
    let (base, _pool, (_, alice_token), (bob_id, bob_token)) = setup().await;

    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;
    join_and_settle(&mut a, "room-1").await;

    let (mut b1, _) = ws_connect_ready(&base, &bob_token).await;
    join_and_settle(&mut b1, "room-1").await;
    drain_messages(&mut a).await;

    let (mut b2, _) = ws_connect_ready(&base, &bob_token).await;
    join_and_settle(&mut b2, "room-1").await;

    let frames = drain_messages(&mut a).await;
    assert!(of_type(&frames, "user_joined").is_empty());
    let online = of_type(&frames, "online_users");
    assert_eq!(online.last().unwrap()["count"], 2);

    // one device leaving keeps bob present
    send_json(&mut b1, &json!({"type": "leave_room", "roomId": "room-1"})).await;
    let online = recv_type(&mut a, "online_users").await.unwrap();
    assert_eq!(online["count"], 2);
    let frames = drain_messages(&mut a).await;
    assert!(of_type(&frames, "user_left").is_empty());

    // the last one going drops him
    b2.close(None).await.unwrap();
    let left = recv_type(&mut a, "user_left").await.unwrap();
    assert_eq!(left["userId"], bob_id);
    let online = recv_type(&mut a, "online_users").await.unwrap();
    assert_eq!(online["count"], 1);
}

#[tokio::test]
async fn switching_rooms_leaves_previous() {
    let (base, pool, (alice_id, alice_token), (_, bob_token)) = setup().await;

    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;
    join_and_settle(&mut a, "room-1").await;
    let (mut b, _) = ws_connect_ready(&base, &bob_token).await;
    join_and_settle(&mut b, "room-1").await;
    drain_messages(&mut b).await;

    join_room(&mut a, "room-2").await;

    let left = recv_type(&mut b, "user_left").await.unwrap();
    assert_eq!(left["userId"], alice_id);
    assert_eq!(left["roomId"], "room-1");
    let online = recv_type(&mut b, "online_users").await.unwrap();
    assert_eq!(online["count"], 1);

    // room-2 traffic does not reach bob
    send_json(
        &mut a,
        &json!({"type": "send_message", "roomId": "room-2", "content": "elsewhere"}),
    )
    .await;
    recv_type(&mut a, "new_message").await.unwrap();
    let frames = drain_messages(&mut b).await;
    assert!(of_type(&frames, "new_message").is_empty());

    assert!(
        common::eventually(|| async { common::active_members(&pool, "room-2").await == 1 }).await
    );
}

#[tokio::test]
async fn leaving_a_room_not_joined_is_silent() {
    let (base, _pool, (_, alice_token), _) = setup().await;
    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;

    send_json(&mut a, &json!({"type": "leave_room", "roomId": "room-1"})).await;
    assert!(drain_messages(&mut a).await.is_empty());
}

#[tokio::test]
async fn disconnect_clears_presence_and_typing() {
    let (base, pool, (_, alice_token), (bob_id, bob_token)) = setup().await;

    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;
    join_and_settle(&mut a, "room-1").await;
    let (mut b, _) = ws_connect_ready(&base, &bob_token).await;
    join_and_settle(&mut b, "room-1").await;
    drain_messages(&mut a).await;

    send_json(&mut b, &json!({"type": "typing_start", "roomId": "room-1"})).await;
    recv_type(&mut a, "user_typing").await.unwrap();

    drop(b);

    let stopped = recv_type(&mut a, "user_stopped_typing").await.unwrap();
    assert_eq!(stopped["userId"], bob_id);
    let left = recv_type(&mut a, "user_left").await.unwrap();
    assert_eq!(left["userId"], bob_id);

    assert!(
        common::eventually(|| async { common::active_members(&pool, "room-1").await == 1 }).await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn active_members_settles_on_final_occupancy() {
    let (base, pool, (_, alice_token), _) = setup().await;
    let (mut a, _) = ws_connect_ready(&base, &alice_token).await;
    join_and_settle(&mut a, "room-1").await;

    let mut guests = Vec::new();
    for n in 0..6 {
        let (user_id, token) = common::create_test_user(&pool, &format!("guest{}", n)).await;
        common::add_member(&pool, "room-1", &user_id).await;
        let (mut ws, _) = ws_connect_ready(&base, &token).await;
        join_room(&mut ws, "room-1").await;
        guests.push(ws);
    }
    // a burst of departures racing the joins' write-through
    guests.truncate(1);

    assert!(
        common::eventually(|| async { common::active_members(&pool, "room-1").await == 2 }).await
    );
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(common::active_members(&pool, "room-1").await, 2);
}
