//! `WatchParty` room synchronization server.
//!
//! An axum WebSocket server that keeps every participant of a room on
//! the same roster, chat history, and playback position. Clients connect
//! to `/ws/rooms/{room}` and exchange JSON event envelopes.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin watchparty-server
//!
//! # Run on custom address
//! cargo run --bin watchparty-server -- --bind 127.0.0.1:9090
//!
//! # Or via environment variable
//! WATCHPARTY_ADDR=127.0.0.1:9090 cargo run --bin watchparty-server
//! ```

use std::sync::Arc;

use clap::Parser;
use watchparty_server::config::{ServerCliArgs, ServerConfig};
use watchparty_server::server::{self, ServerState};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting watchparty room server");

    let state = Arc::new(ServerState::with_history_cap(config.history_cap));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "room server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "room server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start room server");
            std::process::exit(1);
        }
    }
}
