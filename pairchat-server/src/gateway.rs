//! Session gateway: authenticates WebSocket upgrade requests and starts
//! the server.
//!
//! Authentication itself belongs to the external account collaborator; the
//! gateway only asks it to resolve a bearer token into a user id. A request
//! that cannot be resolved is rejected with `401` before any connection
//! handler exists.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use serde::Deserialize;

use pairchat_proto::message::UserId;

use crate::connection;
use crate::presence::PresenceRegistry;
use crate::profile::ProfileDirectory;
use crate::router::{ChatRouter, RouterLimits};
use crate::store::MessageStore;

/// Boundary to the external auth collaborator.
pub trait Authenticator: Send + Sync {
    /// Resolves a bearer token into a verified user id, or `None` to
    /// reject the upgrade.
    fn authenticate(&self, token: &str) -> Option<UserId>;
}

/// In-memory token table, seeded from the server configuration.
#[derive(Default)]
pub struct TokenTable {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl TokenTable {
    /// Creates an empty table that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a token for a user.
    pub fn insert(&self, token: impl Into<String>, user_id: UserId) {
        self.tokens.write().insert(token.into(), user_id);
    }
}

impl Authenticator for TokenTable {
    fn authenticate(&self, token: &str) -> Option<UserId> {
        self.tokens.read().get(token).cloned()
    }
}

/// Shared server state: the presence registry, the router, and the auth
/// boundary.
pub struct ServerState<S> {
    /// Process-wide presence registry.
    pub registry: Arc<PresenceRegistry>,
    /// The conversation router over the given store.
    pub router: ChatRouter<S>,
    /// Auth collaborator consulted before each upgrade.
    pub auth: Arc<dyn Authenticator>,
}

impl<S: MessageStore> ServerState<S> {
    /// Wires up a server state over the given collaborators.
    pub fn new(
        store: S,
        profiles: Arc<dyn ProfileDirectory>,
        auth: Arc<dyn Authenticator>,
        limits: RouterLimits,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let router = ChatRouter::new(Arc::clone(&registry), store, profiles, limits);
        Self {
            registry,
            router,
            auth,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// axum handler that authenticates and upgrades a WebSocket request.
async fn ws_handler<S: MessageStore + 'static>(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<ServerState<S>>>,
) -> Response {
    let Some(token) = query.token else {
        tracing::warn!("upgrade rejected: missing token");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(user_id) = state.auth.authenticate(&token) else {
        tracing::warn!("upgrade rejected: unknown token");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    ws.on_upgrade(move |socket| connection::handle_socket(socket, user_id, state))
}

/// Builds the axum application for the chat server.
pub fn app<S: MessageStore + 'static>(state: Arc<ServerState<S>>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state)
}

/// Starts the chat server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code
/// (bind to `127.0.0.1:0` for an OS-assigned port).
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server<S: MessageStore + 'static>(
    addr: &str,
    state: Arc<ServerState<S>>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "chat server error");
        }
    });

    Ok((bound_addr, handle))
}
