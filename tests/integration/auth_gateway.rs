//! Integration tests for the session gateway.
//!
//! Verifies:
//! 1. Upgrade requests without a token or with an unknown token are
//!    rejected with 401 before any connection handler exists.
//! 2. An authenticated connection is immediately usable.
//! 3. Malformed JSON gets an error frame but keeps the connection alive.
//! 4. A binary frame is a framing violation and closes the connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use pairchat_proto::frame::{self, ClientFrame, ErrorCode, ServerEvent};
use pairchat_proto::message::UserId;
use pairchat_server::gateway::{self, ServerState, TokenTable};
use pairchat_server::profile::{InMemoryProfiles, Profile};
use pairchat_server::router::RouterLimits;
use pairchat_server::store::MemoryStore;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_test_server() -> std::net::SocketAddr {
    let auth = TokenTable::new();
    let profiles = InMemoryProfiles::new();
    for (name, display) in [("alice", "Alice"), ("bob", "Bob")] {
        auth.insert(format!("token-{name}"), UserId::from(name));
        profiles.insert(
            UserId::from(name),
            Profile {
                display_name: display.to_string(),
                avatar: None,
            },
        );
    }
    let state = Arc::new(ServerState::new(
        MemoryStore::new(),
        Arc::new(profiles),
        Arc::new(auth),
        RouterLimits::default(),
    ));
    let (addr, _handle) = gateway::start_server("127.0.0.1:0", state)
        .await
        .expect("failed to start test server");
    addr
}

async fn ws_send(ws: &mut Ws, frame: &ClientFrame) {
    let text = frame::encode_client(frame).unwrap();
    ws.send(tungstenite::Message::Text(text.into()))
        .await
        .unwrap();
}

async fn ws_recv(ws: &mut Ws) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("connection closed")
        .expect("websocket error");
    frame::decode_event(msg.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn missing_token_is_rejected_before_upgrade() {
    let addr = start_test_server().await;

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected 401 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_token_is_rejected_before_upgrade() {
    let addr = start_test_server().await;

    let result =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=wrong")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected 401 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn authenticated_connection_is_usable() {
    let addr = start_test_server().await;

    let (mut ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=token-alice"))
            .await
            .unwrap();

    ws_send(
        &mut ws,
        &ClientFrame::FetchHistory {
            peer_id: UserId::from("bob"),
            before_id: None,
            limit: 10,
        },
    )
    .await;

    match ws_recv(&mut ws).await {
        ServerEvent::HistoryResult { peer_id, messages } => {
            assert_eq!(peer_id, UserId::from("bob"));
            assert!(messages.is_empty());
        }
        other => panic!("expected history_result, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_keeps_connection_alive() {
    let addr = start_test_server().await;

    let (mut ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=token-alice"))
            .await
            .unwrap();

    ws.send(tungstenite::Message::Text("{not json".into()))
        .await
        .unwrap();

    match ws_recv(&mut ws).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, ErrorCode::Protocol),
        other => panic!("expected protocol error, got {other:?}"),
    }

    // The connection stays active: a valid request still works.
    ws_send(
        &mut ws,
        &ClientFrame::FetchHistory {
            peer_id: UserId::from("bob"),
            before_id: None,
            limit: 10,
        },
    )
    .await;
    assert!(matches!(
        ws_recv(&mut ws).await,
        ServerEvent::HistoryResult { .. }
    ));
}

#[tokio::test]
async fn binary_frame_closes_the_connection() {
    let addr = start_test_server().await;

    let (mut ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=token-alice"))
            .await
            .unwrap();

    ws.send(tungstenite::Message::Binary(vec![0xDE, 0xAD].into()))
        .await
        .unwrap();

    // The server tears the connection down; the client observes a close
    // frame or the end of the stream.
    let mut closed = false;
    for _ in 0..4 {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(tungstenite::Message::Close(_)))) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(_))) => {}
            Err(_) => break,
        }
    }
    assert!(closed, "connection should have been closed");
}
