//! `PairChat` server -- real-time one-to-one chat over WebSockets.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9600
//! cargo run --bin pairchat-server
//!
//! # Run on custom address
//! cargo run --bin pairchat-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! PAIRCHAT_ADDR=127.0.0.1:8080 cargo run --bin pairchat-server
//! ```
//!
//! Accounts are seeded from the `[[users]]` table of the config file; a
//! client connects to `ws://host/ws?token=<bearer token>`.

use std::sync::Arc;

use clap::Parser;

use pairchat_proto::message::UserId;
use pairchat_server::config::{CliArgs, ServerConfig};
use pairchat_server::gateway::{self, ServerState, TokenTable};
use pairchat_server::profile::{InMemoryProfiles, Profile};
use pairchat_server::store::MemoryStore;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, users = config.users.len(), "starting pairchat server");

    // Seed the auth and profile collaborators from the config.
    let auth = TokenTable::new();
    let profiles = InMemoryProfiles::new();
    for user in &config.users {
        let user_id = UserId::new(user.id.clone());
        auth.insert(user.token.clone(), user_id.clone());
        profiles.insert(
            user_id,
            Profile {
                display_name: user.display_name.clone().unwrap_or_else(|| user.id.clone()),
                avatar: user.avatar.clone(),
            },
        );
    }

    let state = Arc::new(ServerState::new(
        MemoryStore::new(),
        Arc::new(profiles),
        Arc::new(auth),
        config.router_limits(),
    ));

    match gateway::start_server(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "pairchat server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
