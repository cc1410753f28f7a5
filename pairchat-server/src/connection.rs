//! Per-connection lifecycle: register presence, pump frames, clean up.
//!
//! One task pair per live connection. The reader loop decodes inbound JSON
//! text frames into [`ClientFrame`]s and dispatches them to the router; a
//! writer task drains the connection's event channel into outbound frames.
//! Malformed-but-framed input is answered with an `error` frame and the
//! connection stays active; a binary frame on the text protocol is a
//! framing violation and closes the connection.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use pairchat_proto::frame::{self, ClientFrame, ErrorCode, ServerEvent};
use pairchat_proto::message::UserId;

use crate::gateway::ServerState;
use crate::presence::{ConnHandle, ConnId, EventSender};
use crate::router::RouterError;
use crate::store::MessageStore;

/// Drives one authenticated WebSocket connection to completion.
///
/// The lifecycle:
/// 1. Mint a connection handle and register it in the presence registry.
/// 2. Broadcast the online transition, if this was the user's first
///    connection.
/// 3. Spawn the writer task and run the reader loop.
/// 4. On close or transport failure, unregister exactly once (the registry
///    tolerates repeats) and broadcast the offline transition.
pub async fn handle_socket<S: MessageStore + 'static>(
    socket: WebSocket,
    user_id: UserId,
    state: Arc<ServerState<S>>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let conn_id = state.registry.next_conn_id();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.router.attach(conn_id, tx.clone()).await;
    if let Some(change) = state
        .registry
        .register(&user_id, ConnHandle::new(conn_id, tx.clone()))
        .await
    {
        state.router.notify_presence(&change).await;
    }

    tracing::info!(user = %user_id, conn = %conn_id, "connection active");

    // Writer task: serialize router events into outbound text frames.
    let writer_user = user_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match frame::encode_event(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(user = %writer_user, error = %e, "failed to encode event");
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                tracing::warn!(user = %writer_user, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: decode and dispatch inbound frames.
    let reader_user = user_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_frame(&reader_user, conn_id, text.as_str(), &reader_state, &tx).await;
                }
                WsMessage::Close(_) => {
                    tracing::info!(user = %reader_user, conn = %conn_id, "received close frame");
                    break;
                }
                WsMessage::Binary(_) => {
                    // Framing violation on a text protocol: fatal.
                    tracing::warn!(user = %reader_user, conn = %conn_id, "binary frame, closing");
                    break;
                }
                _ => {
                    // Ping/pong frames are handled by the transport.
                }
            }
        }
    });

    // Whichever side finishes first tears down the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.router.forget(conn_id).await;
    if let Some(change) = state.registry.unregister(&user_id, conn_id).await {
        state.router.notify_presence(&change).await;
    }
    tracing::info!(user = %user_id, conn = %conn_id, "connection closed");
}

/// Decodes one inbound frame and dispatches it to the router.
///
/// Router errors come back to this connection as `error` frames and are
/// never fatal.
async fn handle_frame<S: MessageStore>(
    user_id: &UserId,
    conn_id: ConnId,
    text: &str,
    state: &Arc<ServerState<S>>,
    reply: &EventSender,
) {
    let frame = match frame::decode_client(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(user = %user_id, error = %e, "undecodable frame");
            send_error(reply, ErrorCode::Protocol, &e.to_string());
            return;
        }
    };

    match frame {
        ClientFrame::SendMessage { recipient_id, body } => {
            state.router.watch(conn_id, recipient_id.clone()).await;
            if let Err(e) = state.router.send_message(user_id, &recipient_id, &body).await {
                reply_router_error(reply, &e);
            }
        }
        ClientFrame::Typing {
            recipient_id,
            is_typing,
        } => {
            state.router.watch(conn_id, recipient_id.clone()).await;
            state
                .router
                .notify_typing(user_id, &recipient_id, is_typing)
                .await;
        }
        ClientFrame::DeleteMessage { message_id } => {
            if let Err(e) = state.router.delete_message(user_id, message_id).await {
                reply_router_error(reply, &e);
            }
        }
        ClientFrame::FetchHistory {
            peer_id,
            before_id,
            limit,
        } => {
            state.router.watch(conn_id, peer_id.clone()).await;
            match state
                .router
                .fetch_history(user_id, &peer_id, before_id, limit)
                .await
            {
                Ok(messages) => {
                    let _ = reply.send(ServerEvent::HistoryResult { peer_id, messages });
                }
                Err(e) => reply_router_error(reply, &e),
            }
        }
    }
}

fn reply_router_error(reply: &EventSender, error: &RouterError) {
    send_error(reply, error.code(), &error.to_string());
}

fn send_error(reply: &EventSender, code: ErrorCode, detail: &str) {
    let _ = reply.send(ServerEvent::Error {
        code,
        detail: detail.to_string(),
    });
}
