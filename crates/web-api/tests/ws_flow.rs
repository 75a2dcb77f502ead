mod support;

use std::time::Duration;

use config::AppConfig;
use domain::SessionId;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage};
use uuid::Uuid;

use support::{display_names, expect_frame, next_frame, send_command, TestServer};

#[tokio::test]
async fn websocket_chat_flow() {
    let server = TestServer::spawn(AppConfig::default()).await;

    let (mut alice, alice_id) = server.connect().await;
    send_command(&mut alice, json!({"type": "join", "payload": {"displayName": "Alice"}})).await;

    let snapshot = expect_frame(&mut alice, "historySnapshot").await;
    assert_eq!(snapshot["messages"], json!([]));
    let users = expect_frame(&mut alice, "activeUsers").await;
    assert_eq!(display_names(&users), vec!["Alice"]);

    let (mut bob, bob_id) = server.connect().await;
    assert_ne!(alice_id, bob_id);
    send_command(&mut bob, json!({"type": "join", "payload": {"displayName": "Bob"}})).await;

    let snapshot = expect_frame(&mut bob, "historySnapshot").await;
    assert_eq!(snapshot["messages"][0]["body"], "Alice joined the chat");
    assert_eq!(snapshot["messages"][0]["kind"], "system");
    let users = expect_frame(&mut bob, "activeUsers").await;
    assert_eq!(display_names(&users), vec!["Alice", "Bob"]);

    let notice = expect_frame(&mut alice, "systemNotice").await;
    assert_eq!(notice["message"]["body"], "Bob joined the chat");
    let users = expect_frame(&mut alice, "activeUsers").await;
    assert_eq!(display_names(&users), vec!["Alice", "Bob"]);

    // 消息广播给包括发送者在内的所有人
    send_command(&mut bob, json!({"type": "sendMessage", "payload": {"body": "hi there"}})).await;
    for ws in [&mut alice, &mut bob] {
        let payload = expect_frame(ws, "message").await;
        assert_eq!(payload["message"]["body"], "hi there");
        assert_eq!(payload["message"]["authorSessionId"], bob_id.as_str());
        assert_eq!(payload["message"]["authorDisplayName"], "Bob");
    }

    send_command(&mut alice, json!({"type": "setTyping", "payload": {"isTyping": true}})).await;
    let typing = expect_frame(&mut bob, "typingState").await;
    assert_eq!(typing, json!({"sessionId": alice_id.as_str(), "isTyping": true}));

    // 被拒绝的命令只给发起方回错误帧
    send_command(&mut bob, json!({"type": "sendMessage", "payload": {"body": "   "}})).await;
    let error = expect_frame(&mut bob, "error").await;
    assert_eq!(error["code"], "EMPTY_MESSAGE");

    bob.send(TungsteniteMessage::text("not json")).await.unwrap();
    let error = expect_frame(&mut bob, "error").await;
    assert_eq!(error["code"], "INVALID_COMMAND");

    let users: Value = Client::new()
        .get(server.http_url("/api/v1/room/users"))
        .send()
        .await
        .expect("users request")
        .json()
        .await
        .expect("users json");
    assert_eq!(users.as_array().unwrap().len(), 2);
    assert_eq!(users[0]["typing"], true);

    // Alice 断开连接
    alice.close(None).await.unwrap();

    let typing = expect_frame(&mut bob, "typingState").await;
    assert_eq!(typing, json!({"sessionId": alice_id.as_str(), "isTyping": false}));
    let notice = expect_frame(&mut bob, "systemNotice").await;
    assert_eq!(notice["message"]["body"], "Alice left the chat");
    let users = expect_frame(&mut bob, "activeUsers").await;
    assert_eq!(display_names(&users), vec!["Bob"]);
}

#[tokio::test]
async fn websocket_leave_closes_connection() {
    let server = TestServer::spawn(AppConfig::default()).await;

    let (mut alice, _) = server.connect().await;
    send_command(&mut alice, json!({"type": "join", "payload": {"displayName": "Alice"}})).await;
    expect_frame(&mut alice, "historySnapshot").await;
    expect_frame(&mut alice, "activeUsers").await;

    send_command(&mut alice, json!({"type": "leave"})).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = alice.next().await {
            match message {
                Ok(TungsteniteMessage::Close(_)) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
        true
    })
    .await
    .expect("close timeout");
    assert!(closed);

    assert!(server.state.coordinator.active_users().await.is_empty());
    let history = server.state.coordinator.history().await;
    assert_eq!(history.last().unwrap().body.as_str(), "Alice left the chat");
}

#[tokio::test]
async fn websocket_rejects_commands_before_join() {
    let server = TestServer::spawn(AppConfig::default()).await;

    let (mut ws, _) = server.connect().await;
    send_command(&mut ws, json!({"type": "sendMessage", "payload": {"body": "early"}})).await;
    let error = expect_frame(&mut ws, "error").await;
    assert_eq!(error["code"], "UNKNOWN_SESSION");

    send_command(&mut ws, json!({"type": "join", "payload": {"displayName": "  "}})).await;
    let error = expect_frame(&mut ws, "error").await;
    assert_eq!(error["code"], "INVALID_DISPLAY_NAME");

    send_command(&mut ws, json!({"type": "join", "payload": {"displayName": "Carol"}})).await;
    expect_frame(&mut ws, "historySnapshot").await;
    expect_frame(&mut ws, "activeUsers").await;

    send_command(&mut ws, json!({"type": "join", "payload": {"displayName": "Carol"}})).await;
    let error = expect_frame(&mut ws, "error").await;
    assert_eq!(error["code"], "ALREADY_JOINED");
}

#[tokio::test]
async fn websocket_keepalive_ping() {
    let mut config = AppConfig::default();
    config.server.keepalive_interval_secs = 1;
    let server = TestServer::spawn(config).await;

    let (mut ws, _) = server.connect().await;

    let got_ping = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, TungsteniteMessage::Ping(_)) {
                return true;
            }
        }
        false
    })
    .await
    .expect("ping timeout");
    assert!(got_ping);

    // 保活不影响正常命令
    send_command(&mut ws, json!({"type": "heartbeat"})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["payload"]["code"], "UNKNOWN_SESSION");
}

#[tokio::test]
async fn websocket_ping_refreshes_activity() {
    let server = TestServer::spawn(AppConfig::default()).await;

    let (mut ws, session_id) = server.connect().await;
    send_command(&mut ws, json!({"type": "join", "payload": {"displayName": "Dora"}})).await;
    expect_frame(&mut ws, "historySnapshot").await;
    expect_frame(&mut ws, "activeUsers").await;

    let session_id = SessionId::from(Uuid::parse_str(&session_id).unwrap());
    let before = server
        .state
        .coordinator
        .session(session_id)
        .await
        .unwrap()
        .last_activity_at;
    tokio::time::sleep(Duration::from_millis(20)).await;

    ws.send(TungsteniteMessage::Ping(Default::default())).await.unwrap();
    let got_pong = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, TungsteniteMessage::Pong(_)) {
                return true;
            }
        }
        false
    })
    .await
    .expect("pong timeout");
    assert!(got_pong);

    let after = server
        .state
        .coordinator
        .session(session_id)
        .await
        .unwrap()
        .last_activity_at;
    assert!(after > before);
}

#[tokio::test]
async fn websocket_rejects_connections_beyond_pending_limit() {
    let mut config = AppConfig::default();
    config.room.max_sessions = Some(1);
    let server = TestServer::spawn(config).await;

    let (_first, _) = server.connect().await;

    let url = format!("ws://{}/api/v1/ws", server.addr);
    let (mut second, _) = connect_async(url).await.expect("connect websocket");
    let error = expect_frame(&mut second, "error").await;
    assert_eq!(error["code"], "ROOM_FULL");
}
