mod support;

use domain::{Message, ServerEvent};
use futures_util::SinkExt;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as TungsteniteMessage},
};

use support::{next_event, TestServer};

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start().await;

    let body = Client::new()
        .get(server.http("/health"))
        .send()
        .await
        .expect("health")
        .json::<serde_json::Value>()
        .await
        .expect("json");

    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn handshake_without_valid_token_is_rejected() {
    let server = TestServer::start().await;

    for url in [
        format!("ws://{}/ws", server.addr),
        server.ws_url("not-a-jwt"),
    ] {
        let err = connect_async(url).await.err().expect("handshake should fail");
        match err {
            WsError::Http(response) => assert_eq!(response.status(), 401),
            other => panic!("expected 401, got {other}"),
        }
    }
    assert!(server.store.created_messages().is_empty());
}

#[tokio::test]
async fn message_sent_over_websocket_reaches_room_subscribers() {
    let server = TestServer::start().await;
    let room_id = server.seed.room.id;

    let (mut alice, _) = connect_async(server.ws_url(&server.token_for(0)))
        .await
        .expect("alice connects");
    let (mut bob, _) = connect_async(server.ws_url(&server.token_for(1)))
        .await
        .expect("bob connects");

    next_event(&mut alice, |e| matches!(e, ServerEvent::OnlineUsers(_))).await;
    next_event(&mut bob, |e| matches!(e, ServerEvent::OnlineUsers(_))).await;

    let join = json!({ "event": "join_room", "data": { "roomId": room_id } }).to_string();
    bob.send(TungsteniteMessage::Text(join.clone().into()))
        .await
        .expect("bob joins");
    // 同一连接的帧按顺序处理：错误回执到达时加入已完成
    bob.send(TungsteniteMessage::Text("ping?".into()))
        .await
        .expect("probe");
    next_event(&mut bob, |e| matches!(e, ServerEvent::Error { .. })).await;
    alice
        .send(TungsteniteMessage::Text(join.into()))
        .await
        .expect("alice joins");
    let alice_summary = server.seed.users[0].clone();
    next_event(&mut bob, |e| {
        matches!(e, ServerEvent::UserJoined { user, .. } if *user == alice_summary)
    })
    .await;

    let send = json!({
        "event": "send_message",
        "data": { "roomId": room_id, "content": "hello" }
    });
    alice
        .send(TungsteniteMessage::Text(send.to_string().into()))
        .await
        .expect("send");

    let event = next_event(&mut bob, |e| matches!(e, ServerEvent::NewMessage(_))).await;
    match event {
        ServerEvent::NewMessage(message) => {
            assert_eq!(message.content, "hello");
            assert_eq!(message.sender, server.seed.users[0]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    next_event(&mut alice, |e| matches!(e, ServerEvent::NewMessage(_))).await;

    let history = Client::new()
        .get(server.http(&format!("/api/v1/rooms/{room_id}/messages")))
        .bearer_auth(server.token_for(2))
        .send()
        .await
        .expect("history")
        .json::<Vec<Message>>()
        .await
        .expect("history json");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hello");
}

#[tokio::test]
async fn malformed_frame_gets_error_event_and_connection_survives() {
    let server = TestServer::start().await;
    let (mut ws, _) = connect_async(server.ws_url(&server.token_for(0)))
        .await
        .expect("connects");

    ws.send(TungsteniteMessage::Text("{not json".into()))
        .await
        .expect("send");
    let event = next_event(&mut ws, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert_eq!(event, ServerEvent::error("Invalid event payload"));

    let join = json!({ "event": "join_room", "data": { "roomId": domain::RoomId::new() } });
    ws.send(TungsteniteMessage::Text(join.to_string().into()))
        .await
        .expect("send");
    let event = next_event(&mut ws, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert_eq!(event, ServerEvent::error("Room not found"));
}

#[tokio::test]
async fn history_requires_token() {
    let server = TestServer::start().await;
    let room_id = server.seed.room.id;

    let response = Client::new()
        .get(server.http(&format!("/api/v1/rooms/{room_id}/messages")))
        .send()
        .await
        .expect("history");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
