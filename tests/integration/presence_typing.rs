//! End-to-end presence and typing indicator behavior.
//!
//! Verifies:
//! 1. Typing indicators reach an online peer and are dropped for an
//!    offline one — never queued, never stored.
//! 2. Presence transitions are broadcast only to connections viewing the
//!    user as a conversation peer.
//! 3. `last_seen` is stamped on the offline transition.
//! 4. A user with several connections stays online until the last one
//!    closes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use pairchat_proto::frame::{self, ClientFrame, ServerEvent};
use pairchat_proto::message::{Message, UserId};
use pairchat_proto::presence::PresenceStatus;
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
    for (name, display) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
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

/// Connects with a token and opens the conversation with `peer` by
/// fetching history, which also marks presence interest in the peer.
async fn connect_and_sync(
    addr: std::net::SocketAddr,
    token: &str,
    peer: &str,
) -> (Ws, Vec<Message>) {
    let url = format!("ws://{addr}/ws?token={token}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws_send(
        &mut ws,
        &ClientFrame::FetchHistory {
            peer_id: UserId::from(peer),
            before_id: None,
            limit: 50,
        },
    )
    .await;
    match ws_recv(&mut ws).await {
        ServerEvent::HistoryResult { messages, .. } => (ws, messages),
        other => panic!("expected history_result, got {other:?}"),
    }
}

fn expect_presence(event: &ServerEvent, user: &str, status: PresenceStatus) {
    match event {
        ServerEvent::PresenceChanged {
            user_id,
            status: got,
            ..
        } => {
            assert_eq!(user_id, &UserId::from(user));
            assert_eq!(*got, status);
        }
        other => panic!("expected presence_changed, got {other:?}"),
    }
}

#[tokio::test]
async fn typing_indicator_reaches_online_peer() {
    let addr = start_test_server().await;

    let (mut alice, _) = connect_and_sync(addr, "token-alice", "bob").await;
    let (mut bob, _) = connect_and_sync(addr, "token-bob", "alice").await;
    expect_presence(&ws_recv(&mut alice).await, "bob", PresenceStatus::Online);

    ws_send(
        &mut alice,
        &ClientFrame::Typing {
            recipient_id: UserId::from("bob"),
            is_typing: true,
        },
    )
    .await;
    match ws_recv(&mut bob).await {
        ServerEvent::Typing { sender_id, is_typing } => {
            assert_eq!(sender_id, UserId::from("alice"));
            assert!(is_typing);
        }
        other => panic!("expected typing, got {other:?}"),
    }

    ws_send(
        &mut alice,
        &ClientFrame::Typing {
            recipient_id: UserId::from("bob"),
            is_typing: false,
        },
    )
    .await;
    match ws_recv(&mut bob).await {
        ServerEvent::Typing { is_typing, .. } => assert!(!is_typing),
        other => panic!("expected typing, got {other:?}"),
    }
}

#[tokio::test]
async fn typing_to_offline_peer_is_dropped_without_record() {
    let addr = start_test_server().await;

    let (mut alice, _) = connect_and_sync(addr, "token-alice", "bob").await;

    // Bob is offline: the indicator vanishes, no error comes back.
    ws_send(
        &mut alice,
        &ClientFrame::Typing {
            recipient_id: UserId::from("bob"),
            is_typing: true,
        },
    )
    .await;

    // The very next event alice sees is the ack for a follow-up message,
    // not an error for the typing frame.
    ws_send(
        &mut alice,
        &ClientFrame::SendMessage {
            recipient_id: UserId::from("bob"),
            body: "after typing".to_string(),
        },
    )
    .await;
    assert!(matches!(
        ws_recv(&mut alice).await,
        ServerEvent::MessageSentAck { .. }
    ));

    // And nothing about typing was stored: bob's history has one message.
    let (_bob, history) = connect_and_sync(addr, "token-bob", "alice").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "after typing");
}

#[tokio::test]
async fn disconnect_broadcasts_offline_with_last_seen() {
    let addr = start_test_server().await;

    let (mut alice, _) = connect_and_sync(addr, "token-alice", "bob").await;
    let (mut bob, _) = connect_and_sync(addr, "token-bob", "alice").await;
    expect_presence(&ws_recv(&mut alice).await, "bob", PresenceStatus::Online);

    bob.close(None).await.unwrap();

    match ws_recv(&mut alice).await {
        ServerEvent::PresenceChanged {
            user_id,
            status,
            last_seen,
        } => {
            assert_eq!(user_id, UserId::from("bob"));
            assert_eq!(status, PresenceStatus::Offline);
            assert!(last_seen.is_some(), "offline transition must stamp last_seen");
        }
        other => panic!("expected presence_changed, got {other:?}"),
    }

    // Reconnect flips bob back online for the watching connection.
    let (_bob2, _) = connect_and_sync(addr, "token-bob", "alice").await;
    expect_presence(&ws_recv(&mut alice).await, "bob", PresenceStatus::Online);
}

#[tokio::test]
async fn presence_is_not_broadcast_to_uninterested_connections() {
    let addr = start_test_server().await;

    // Carol is only talking to alice; she never opened a conversation
    // with bob.
    let (mut carol, _) = connect_and_sync(addr, "token-carol", "alice").await;

    let (mut bob, _) = connect_and_sync(addr, "token-bob", "carol").await;
    bob.close(None).await.unwrap();

    // Carol must not see bob's transitions. Prove it by exchanging a
    // message afterwards: the first event carol sees is the ack.
    ws_send(
        &mut carol,
        &ClientFrame::SendMessage {
            recipient_id: UserId::from("alice"),
            body: "quiet here".to_string(),
        },
    )
    .await;
    assert!(matches!(
        ws_recv(&mut carol).await,
        ServerEvent::MessageSentAck { .. }
    ));
}

#[tokio::test]
async fn user_stays_online_until_last_connection_closes() {
    let addr = start_test_server().await;

    let (mut alice, _) = connect_and_sync(addr, "token-alice", "bob").await;
    let (mut bob_tab1, _) = connect_and_sync(addr, "token-bob", "alice").await;
    expect_presence(&ws_recv(&mut alice).await, "bob", PresenceStatus::Online);

    // Second tab: no transition, so no event for alice.
    let (mut bob_tab2, _) = connect_and_sync(addr, "token-bob", "alice").await;

    // Closing one tab is not an offline transition either.
    bob_tab2.close(None).await.unwrap();

    // Closing the last tab is: the next presence event alice sees is the
    // single offline broadcast.
    bob_tab1.close(None).await.unwrap();
    match ws_recv(&mut alice).await {
        ServerEvent::PresenceChanged { user_id, status, .. } => {
            assert_eq!(user_id, UserId::from("bob"));
            assert_eq!(status, PresenceStatus::Offline);
        }
        other => panic!("expected single offline broadcast, got {other:?}"),
    }
}
