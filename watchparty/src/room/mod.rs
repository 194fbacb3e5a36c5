//! Room session controller.
//!
//! A [`RoomSession`] binds to exactly one room and, while alive, owns
//! exactly one underlying [`ConnectionManager`]. Inbound server events
//! are reconciled into [`RoomState`] in arrival order by a dispatch
//! task; outbound intents are thin envelope constructions over the
//! connection's fire-and-forget `send`. The controller never applies
//! optimistic local state — playback and roster only change through the
//! authoritative inbound events.

pub mod state;

pub use state::{DEFAULT_MESSAGE_CAP, RoomState};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use watchparty_proto::client::ClientEvent;
use watchparty_proto::server::ServerEvent;

use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, EndpointError, ReconnectConfig,
    room_endpoint,
};

/// Capacity of the session event channel.
const SESSION_EVENT_BUFFER: usize = 256;

/// Configuration for joining a room.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket base URL, e.g. `ws://localhost:8080`.
    pub ws_base_url: String,
    /// Room code or id to join.
    pub room_code: String,
    /// Auth token carried as a connection-establishment query parameter.
    pub token: Option<String>,
    /// The local participant's server-assigned id, when already known.
    /// Used to gate playback intents on the roster's permission flag;
    /// `None` skips client-side gating and lets the server enforce.
    pub local_participant_id: Option<String>,
    /// Bound on retained chat messages.
    pub message_cap: usize,
    /// Reconnection backoff policy.
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    /// Creates a config with default retention and backoff.
    #[must_use]
    pub fn new(ws_base_url: impl Into<String>, room_code: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            room_code: room_code.into(),
            token: None,
            local_participant_id: None,
            message_cap: DEFAULT_MESSAGE_CAP,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// A playback control intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoControl {
    /// Start shared playback.
    Play,
    /// Pause shared playback.
    Pause,
    /// Seek shared playback to a position in seconds.
    Seek(f64),
}

/// Events surfaced to the session consumer.
#[derive(Debug)]
pub enum SessionEvent {
    /// The room connection opened.
    Connected,
    /// The room connection dropped; accumulated state stays visible and
    /// the server's `room:init` resynchronizes it on reconnect.
    Disconnected,
    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// 1-based retry number.
        attempt: u32,
        /// Delay before the attempt fires.
        delay: Duration,
    },
    /// Automatic reconnection gave up; call
    /// [`RoomSession::reconnect`] to try again.
    ReconnectFailed,
    /// An inbound event changed the room state.
    StateChanged,
    /// A server-pushed application error; the connection stays open.
    ServerError {
        /// Machine-readable error code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

/// Shared, dispatch-written room state.
#[derive(Debug, Clone)]
pub struct SharedRoomState(Arc<Mutex<RoomState>>);

impl SharedRoomState {
    /// Returns a snapshot of the current room state.
    #[must_use]
    pub fn snapshot(&self) -> RoomState {
        self.0.lock().clone()
    }
}

/// Controller for one room-scoped synchronization session.
#[derive(Debug)]
pub struct RoomSession {
    connection: ConnectionManager,
    state: SharedRoomState,
    local_participant: Arc<Mutex<Option<String>>>,
    room_code: String,
}

impl RoomSession {
    /// Joins a room: builds the endpoint, spawns the connection
    /// supervisor and the event dispatch task.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] when the base URL and room code do not
    /// form a valid `ws`/`wss` endpoint. Connection failures after this
    /// point surface through [`SessionEvent`]s, never as errors here.
    pub fn connect(
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), EndpointError> {
        let url = room_endpoint(
            &config.ws_base_url,
            &config.room_code,
            config.token.as_deref(),
        )?;
        tracing::info!(room = %config.room_code, url = %url, "joining room");

        let (connection, conn_rx) = ConnectionManager::spawn(url, config.reconnect);
        let state = SharedRoomState(Arc::new(Mutex::new(RoomState::new(config.message_cap))));
        let local_participant = Arc::new(Mutex::new(config.local_participant_id));

        let (session_tx, session_rx) = mpsc::channel(SESSION_EVENT_BUFFER);
        let dispatch_state = state.clone();
        tokio::spawn(async move {
            dispatch_loop(conn_rx, dispatch_state, session_tx).await;
        });

        let session = Self {
            connection,
            state,
            local_participant,
            room_code: config.room_code,
        };
        Ok((session, session_rx))
    }

    /// The room this session is bound to.
    #[must_use]
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// Records the local participant's id once it is known (typically
    /// from the room-join API response), enabling the client-side
    /// permission gate on playback intents.
    pub fn set_local_participant(&self, id: impl Into<String>) {
        *self.local_participant.lock() = Some(id.into());
    }

    /// Sends a chat message. Not subject to the permission gate.
    pub fn send_message(&self, content: impl Into<String>) {
        self.connection.send(ClientEvent::Chat {
            message: content.into(),
        });
    }

    /// Sends a playback control intent.
    ///
    /// When the local participant is known and lacks control permission
    /// the intent is dropped before transmission. No optimistic state is
    /// applied; playback changes only via the authoritative echo.
    pub fn send_video_control(&self, control: VideoControl) {
        let event = match control {
            VideoControl::Play => ClientEvent::Play,
            VideoControl::Pause => ClientEvent::Pause,
            VideoControl::Seek(current_time) => ClientEvent::Seek { current_time },
        };
        self.send_gated(event);
    }

    /// Reports a full local playback snapshot (host periodic sync).
    pub fn send_sync(&self, current_time: f64, is_playing: bool, playback_rate: f64) {
        self.send_gated(ClientEvent::Sync {
            current_time,
            is_playing,
            playback_rate,
        });
    }

    /// Switches the room to a different video.
    pub fn change_video(&self, video_id: impl Into<String>) {
        self.send_gated(ClientEvent::ChangeVideo {
            video_id: video_id.into(),
        });
    }

    /// Shared view of the reconciled room state.
    #[must_use]
    pub fn state(&self) -> SharedRoomState {
        self.state.clone()
    }

    /// Snapshot of the reconciled room state.
    #[must_use]
    pub fn snapshot(&self) -> RoomState {
        self.state.snapshot()
    }

    /// Snapshot of the connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state().snapshot()
    }

    /// Whether the room connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Requests an immediate reconnect, e.g. after
    /// [`SessionEvent::ReconnectFailed`].
    pub fn reconnect(&self) {
        self.connection.reconnect();
    }

    /// Leaves the room, tearing the connection down. The session cannot
    /// be reused afterwards; join again with a fresh session.
    pub fn leave(&self) {
        tracing::info!(room = %self.room_code, "leaving room");
        self.connection.disconnect();
    }

    /// Applies the permission gate, then sends.
    fn send_gated(&self, event: ClientEvent) {
        if event.is_playback_control()
            && let Some(id) = self.local_participant.lock().as_deref()
            && !self.state.0.lock().has_control_permission(id)
        {
            tracing::warn!(
                participant = id,
                event_type = event.event_type(),
                "dropping playback intent: no control permission"
            );
            return;
        }
        self.connection.send(event);
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

/// Dispatch task: reconciles connection events into room state and
/// forwards session events until the connection supervisor exits.
async fn dispatch_loop(
    mut conn_rx: mpsc::Receiver<ConnectionEvent>,
    state: SharedRoomState,
    session_tx: mpsc::Sender<SessionEvent>,
) {
    while let Some(event) = conn_rx.recv().await {
        let session_event = match event {
            ConnectionEvent::Connected => SessionEvent::Connected,
            ConnectionEvent::Disconnected => SessionEvent::Disconnected,
            ConnectionEvent::Reconnecting { attempt, delay } => {
                SessionEvent::Reconnecting { attempt, delay }
            }
            ConnectionEvent::ReconnectFailed => SessionEvent::ReconnectFailed,
            ConnectionEvent::Event(ServerEvent::Error(error)) => {
                tracing::warn!(code = %error.code, message = %error.message, "server error event");
                SessionEvent::ServerError {
                    code: error.code,
                    message: error.message,
                }
            }
            ConnectionEvent::Event(server_event) => {
                state.0.lock().apply(&server_event);
                SessionEvent::StateChanged
            }
        };
        if session_tx.send(session_event).await.is_err() {
            // Consumer dropped the receiver; stop dispatching.
            break;
        }
    }
    tracing::debug!("room dispatch loop exiting");
}
