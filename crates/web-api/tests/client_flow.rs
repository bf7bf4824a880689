mod support;

use std::sync::Arc;
use std::time::Duration;

use client::{
    ClientError, ConnectionState, ReconnectConfig, ReconnectController, TransportError,
    WebSocketTransport,
};
use domain::{ClientEvent, ServerEvent};

use support::TestServer;

fn controller_for(server: &TestServer, token: String) -> ReconnectController {
    let transport = WebSocketTransport::new(format!("ws://{}/ws", server.addr), token);
    ReconnectController::new(Arc::new(transport), ReconnectConfig::default())
}

async fn next_matching<F>(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
    mut matches: F,
) -> ServerEvent
where
    F: FnMut(&ServerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn client_sends_queued_join_and_receives_its_message() {
    let server = TestServer::start().await;
    let room_id = server.seed.room.id;
    let controller = controller_for(&server, server.token_for(0));
    let mut events = controller.events().expect("event stream");

    // 连接前发出的事件先排队，连接后依次写出
    controller.emit(ClientEvent::JoinRoom { room_id });
    controller.emit(ClientEvent::SendMessage {
        room_id,
        content: "from the client".into(),
        reply_to: None,
    });
    assert_eq!(controller.queued(), 2);

    controller.connect().await.expect("connect");
    assert_eq!(controller.state(), ConnectionState::Connected);

    let event = next_matching(&mut events, |e| matches!(e, ServerEvent::NewMessage(_))).await;
    match event {
        ServerEvent::NewMessage(message) => assert_eq!(message.content, "from the client"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(controller.active_room(), Some(room_id));
    controller.disconnect();
}

#[tokio::test]
async fn client_with_bad_token_stays_disconnected() {
    let server = TestServer::start().await;
    let controller = controller_for(&server, "garbage".to_string());

    let err = controller.connect().await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Transport(TransportError::Rejected { status: 401 })
    ));
    assert_eq!(controller.state(), ConnectionState::Disconnected);
}
