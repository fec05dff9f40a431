//! Integration tests for the reconnecting channel against a real
//! tokio-tungstenite server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use memora_protocol::{ChatMessage, ClientFrame, ServerFrame};
use memora_transport::{Channel, ChannelConfig, ChannelStatus, Identity};

async fn wait_for(status: &mut watch::Receiver<ChannelStatus>, want: ChannelStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while *status.borrow_and_update() != want {
            status.changed().await.expect("status channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"));
}

fn chat(content: &str) -> ClientFrame {
    ClientFrame::ChatMessage(ChatMessage {
        content: content.into(),
        session_id: None,
        user_id: "alice".into(),
        photo_context: None,
        photo_ids: Vec::new(),
        conversation_history: Vec::new(),
        cist_progress: Default::default(),
        cist_scores: Default::default(),
        turn_count: 0,
        timestamp: "2025-01-01T00:00:00Z".into(),
    })
}

#[tokio::test]
async fn chat_round_trip_carries_identity_params() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut request_uri = None;
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &tokio_tungstenite::tungstenite::handshake::server::Request, resp| {
            request_uri = Some(req.uri().to_string());
            Ok(resp)
        })
        .await
        .unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();

        let incoming = ws_rx.next().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(incoming.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["user_id"], "alice");

        ws_tx
            .send(Message::Text(
                json!({"type": "conversation_response", "content": "hi", "session_id": "s1"})
                    .to_string(),
            ))
            .await
            .unwrap();

        request_uri.unwrap()
    });

    let config = ChannelConfig::new(
        format!("ws://{addr}/ws"),
        Identity::new("alice").with_room("session_alice_1"),
    );
    let (handle, mut events) = Channel::connect(config);

    wait_for(&mut events.status, ChannelStatus::Connected).await;
    handle.send(chat("hello")).unwrap();

    let frame = events.inbound.recv().await.expect("should receive reply");
    let ServerFrame::ConversationResponse(response) = frame else {
        panic!("expected conversation_response, got {frame:?}");
    };
    assert_eq!(response.content, "hi");

    drop(handle);
    drop(events);
    let uri = server.await.unwrap();
    assert!(uri.contains("user_id=alice"), "uri was {uri}");
    assert!(uri.contains("room_id=session_alice_1"), "uri was {uri}");
}

#[tokio::test]
async fn reconnects_after_lost_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First connection: handshake, then drop abruptly.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Second connection: greet so the client can observe the recovery.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();
        ws_tx
            .send(Message::Text(
                json!({"type": "conversation_response", "content": "back"}).to_string(),
            ))
            .await
            .unwrap();
        let _ = ws_rx.next().await;
    });

    let config = ChannelConfig::new(format!("ws://{addr}/ws"), Identity::new("alice"))
        .with_reconnect_base_delay(Duration::from_millis(10));
    let (handle, mut events) = Channel::connect(config);

    let frame = tokio::time::timeout(Duration::from_secs(5), events.inbound.recv())
        .await
        .expect("timed out waiting for reconnect")
        .expect("inbound closed");
    let ServerFrame::ConversationResponse(response) = frame else {
        panic!("expected conversation_response, got {frame:?}");
    };
    assert_eq!(response.content, "back");
    assert_eq!(handle.status(), ChannelStatus::Connected);

    drop(handle);
    drop(events);
    server.await.unwrap();
}

#[tokio::test]
async fn parks_after_exhausting_attempts_until_explicit_reconnect() {
    // Reserve a port, then refuse connections on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ChannelConfig::new(format!("ws://{addr}/ws"), Identity::new("alice"))
        .with_max_reconnect_attempts(2)
        .with_reconnect_base_delay(Duration::from_millis(5));
    let (handle, mut events) = Channel::connect(config);

    // 1 initial + 2 automatic attempts at 5/10 ms; well settled by 200 ms.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*events.status.borrow(), ChannelStatus::Disconnected);

    // Bring the endpoint up and reconnect explicitly: the counter resets and
    // a fresh cycle starts immediately.
    let listener = TcpListener::bind(addr).await.unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (_ws_tx, mut ws_rx) = ws.split();
        let _ = ws_rx.next().await;
    });

    handle.reconnect();
    wait_for(&mut events.status, ChannelStatus::Connected).await;

    drop(handle);
    drop(events);
    server.await.unwrap();
}

#[tokio::test]
async fn disconnect_cancels_scheduled_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // A second accept would mean the cancelled timer still fired.
        match tokio::time::timeout(Duration::from_millis(400), listener.accept()).await {
            Err(_) => {}
            Ok(_) => panic!("reconnect attempted after explicit disconnect"),
        }
    });

    let config = ChannelConfig::new(format!("ws://{addr}/ws"), Identity::new("alice"))
        .with_reconnect_base_delay(Duration::from_millis(150));
    let (handle, mut events) = Channel::connect(config);

    wait_for(&mut events.status, ChannelStatus::Connected).await;
    wait_for(&mut events.status, ChannelStatus::Disconnected).await;
    // The reconnect timer is now pending; disconnect must cancel it.
    handle.disconnect();

    server.await.unwrap();
    assert_eq!(handle.status(), ChannelStatus::Disconnected);
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_closing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();
        ws_tx
            .send(Message::Text("this is not json".into()))
            .await
            .unwrap();
        ws_tx
            .send(Message::Text(json!({"type": "pong"}).to_string()))
            .await
            .unwrap();
        let _ = ws_rx.next().await;
    });

    let config = ChannelConfig::new(format!("ws://{addr}/ws"), Identity::new("alice"));
    let (handle, mut events) = Channel::connect(config);

    wait_for(&mut events.status, ChannelStatus::Connected).await;
    let frame = events.inbound.recv().await.expect("should receive frame");
    assert!(matches!(frame, ServerFrame::Pong), "got {frame:?}");
    assert_eq!(handle.status(), ChannelStatus::Connected);

    drop(handle);
    drop(events);
    server.await.unwrap();
}

#[tokio::test]
async fn keep_alive_probe_is_emitted_while_connected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut ws_tx, mut ws_rx) = ws.split();

        let incoming = ws_rx.next().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(incoming.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "ping");

        ws_tx
            .send(Message::Text(json!({"type": "pong"}).to_string()))
            .await
            .unwrap();
        let _ = ws_rx.next().await;
    });

    let config = ChannelConfig::new(format!("ws://{addr}/ws"), Identity::new("alice"))
        .with_ping_interval(Duration::from_millis(20));
    let (handle, mut events) = Channel::connect(config);

    wait_for(&mut events.status, ChannelStatus::Connected).await;
    let frame = tokio::time::timeout(Duration::from_secs(5), events.inbound.recv())
        .await
        .expect("timed out waiting for pong")
        .expect("inbound closed");
    assert!(matches!(frame, ServerFrame::Pong), "got {frame:?}");

    drop(handle);
    drop(events);
    server.await.unwrap();
}
