//! WebSocket server core: shared state, connection handler, routing.
//!
//! Each connection is bound to one room via the URL path. A writer task
//! forwards broadcasts from the room's channel to the socket while the
//! reader loop parses inbound envelopes and applies them to the room.
//! Malformed or unknown frames are logged and dropped; the connection
//! stays up.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use watchparty_proto::client::ClientEvent;
use watchparty_proto::envelope;

use crate::rooms::RoomRegistry;

/// Shared server state: the room directory.
pub struct ServerState {
    /// Live rooms, keyed by room code.
    pub rooms: RoomRegistry,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates server state with an empty room registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RoomRegistry::new(),
        }
    }

    /// Creates server state with a custom per-room history bound.
    #[must_use]
    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            rooms: RoomRegistry::with_history_cap(history_cap),
        }
    }
}

/// Handles an upgraded WebSocket connection for one participant.
///
/// Lifecycle:
/// 1. Join the room (created on first join); the joiner gets `room:init`.
/// 2. Spawn a writer task draining the participant's event channel.
/// 3. Run the reader loop, applying client events to the room.
/// 4. On disconnect, leave the room and drop it if empty.
pub async fn handle_socket(
    socket: WebSocket,
    state: Arc<ServerState>,
    room_code: String,
    username: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let room = state.rooms.get_or_create(&room_code).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let participant = room.join(&username, tx).await;
    let participant_id = participant.id;

    let writer_username = username.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(user = %writer_username, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_room = Arc::clone(&room);
    let reader_id = participant_id.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_frame(&reader_id, text.as_str(), &reader_room).await;
                }
                Message::Close(_) => {
                    tracing::debug!(user = %reader_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    room.leave(&participant_id).await;
    state.rooms.remove_if_empty(&room_code).await;
    tracing::info!(room = %room_code, user = %username, "connection closed");
}

/// Parses one inbound text frame and applies it to the room.
async fn handle_text_frame(participant_id: &str, text: &str, room: &crate::rooms::Room) {
    let env = match envelope::decode(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(user = %participant_id, err = %e, "dropping malformed frame");
            return;
        }
    };
    let event = match ClientEvent::from_envelope(&env) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                user = %participant_id,
                event_type = %env.event_type,
                err = %e,
                "dropping unknown or invalid event"
            );
            return;
        }
    };

    match event {
        ClientEvent::Chat { ref message } => room.chat(participant_id, message).await,
        ClientEvent::ChangeVideo { ref video_id } => {
            room.change_video(participant_id, video_id).await;
        }
        ClientEvent::Play | ClientEvent::Pause | ClientEvent::Seek { .. } | ClientEvent::Sync { .. } => {
            room.video_control(participant_id, &event).await;
        }
    }
}

/// Starts the room server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the room server with pre-configured [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws/rooms/{room}", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "room server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
///
/// The `token` query parameter carries the display name; connections
/// without one get a generated guest name.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::Path(room): axum::extract::Path<String>,
    axum::extract::Query(params): axum::extract::Query<HashMap<String, String>>,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    let username = params
        .get("token")
        .filter(|t| !t.is_empty())
        .cloned()
        .unwrap_or_else(guest_name);
    ws.on_upgrade(move |socket| handle_socket(socket, state, room, username))
}

fn guest_name() -> String {
    let id = uuid::Uuid::now_v7().simple().to_string();
    format!("guest-{}", &id[..8])
}
