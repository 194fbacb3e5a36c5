//! Reconnecting room connection manager.
//!
//! Owns one WebSocket connection to a room endpoint and transparently
//! recreates the underlying transport on unexpected closure, driven by a
//! supervisor task. Callers observe a stable external state
//! ([`ConnectionStatus`]) and a fire-and-forget [`ConnectionManager::send`]
//! that never blocks or errors — when the connection is down the event is
//! logged and dropped.
//!
//! # State machine
//!
//! `Disconnected → Connecting → Connected → Disconnected` (on close)
//! `→ Connecting` (scheduled retry) … `→ Disconnected` (terminal after
//! max attempts, or explicit [`ConnectionManager::disconnect`]).
//! The pending retry is a single cancellable sleep inside the supervisor,
//! never a self-rescheduling callback chain.

mod endpoint;

pub use endpoint::{EndpointError, room_endpoint};

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use watchparty_proto::client::ClientEvent;
use watchparty_proto::envelope;
use watchparty_proto::server::ServerEvent;

/// Timeout for a single connection-establishment attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the command and event channels.
const CHANNEL_CAPACITY: usize = 256;

/// Reconnection backoff policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay before the first retry.
    pub base_interval: Duration,
    /// Cap applied to the exponential delay.
    pub max_delay: Duration,
    /// Number of automatic retries before the terminal failure state.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (0-based):
    /// `min(base · 2^attempt, max_delay)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_interval.saturating_mul(factor).min(self.max_delay)
    }
}

/// Externally visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No transport; either never connected, between retries, terminal
    /// failure, or explicitly disconnected.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open and envelopes flow.
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot of the connection's external state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// Current status.
    pub status: ConnectionStatus,
    /// Number of reconnect attempts since the last successful open.
    pub reconnect_attempt: u32,
    /// Most recent connection-level error, if any.
    pub last_error: Option<String>,
}

/// Shared, supervisor-written connection state.
#[derive(Debug, Clone, Default)]
pub struct SharedConnectionState(Arc<Mutex<ConnectionState>>);

impl SharedConnectionState {
    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionState {
        self.0.lock().clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.0.lock().status
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.0.lock().status = status;
    }

    fn on_connected(&self) {
        let mut state = self.0.lock();
        state.status = ConnectionStatus::Connected;
        state.reconnect_attempt = 0;
        state.last_error = None;
    }

    fn record_error(&self, error: impl Into<String>) {
        self.0.lock().last_error = Some(error.into());
    }

    fn attempt(&self) -> u32 {
        self.0.lock().reconnect_attempt
    }

    fn increment_attempt(&self) {
        self.0.lock().reconnect_attempt += 1;
    }
}

/// Events emitted by the connection supervisor.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The transport opened (initial connect or successful retry).
    Connected,
    /// The transport closed after having been connected.
    Disconnected,
    /// A retry has been scheduled.
    Reconnecting {
        /// 1-based retry number.
        attempt: u32,
        /// Delay before the attempt fires.
        delay: Duration,
    },
    /// Automatic retry gave up after the configured maximum; only an
    /// explicit [`ConnectionManager::reconnect`] continues from here.
    ReconnectFailed,
    /// An inbound server event, in network-arrival order.
    Event(ServerEvent),
}

/// Commands from the handle to the supervisor task.
#[derive(Debug)]
enum Command {
    Send(ClientEvent),
    Disconnect,
    Reconnect,
}

/// Handle to a supervised, reconnecting room connection.
///
/// Dropping the handle closes the command channel, which shuts the
/// supervisor down as if [`disconnect`](Self::disconnect) were called.
#[derive(Debug)]
pub struct ConnectionManager {
    cmd_tx: mpsc::Sender<Command>,
    state: SharedConnectionState,
}

impl ConnectionManager {
    /// Spawns the supervisor for `url` and returns the handle plus the
    /// event receiver. The first connection attempt starts immediately.
    #[must_use]
    pub fn spawn(url: Url, config: ReconnectConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (evt_tx, evt_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let state = SharedConnectionState::default();

        let task_state = state.clone();
        tokio::spawn(async move {
            supervisor(url, config, task_state, cmd_rx, evt_tx).await;
        });

        (Self { cmd_tx, state }, evt_rx)
    }

    /// Sends a client event over the connection.
    ///
    /// Fire-and-forget: when the connection is not currently open the
    /// event is dropped with a logged warning. Never blocks and never
    /// returns an error to the caller.
    pub fn send(&self, event: ClientEvent) {
        if self.state.status() != ConnectionStatus::Connected {
            tracing::warn!(
                event_type = event.event_type(),
                status = %self.state.status(),
                "dropping outbound event: not connected"
            );
            return;
        }
        if let Err(e) = self.cmd_tx.try_send(Command::Send(event)) {
            tracing::warn!(err = %e, "dropping outbound event: command channel unavailable");
        }
    }

    /// Closes the connection intentionally.
    ///
    /// Cancels any pending scheduled reconnect and suppresses the
    /// automatic-reconnect path. Idempotent; safe to call repeatedly.
    pub fn disconnect(&self) {
        if let Err(e) = self.cmd_tx.try_send(Command::Disconnect) {
            tracing::debug!(err = %e, "disconnect: supervisor already gone");
        }
    }

    /// Requests an immediate connection attempt.
    ///
    /// Used to leave the terminal failure state after automatic retry
    /// has given up, or to skip a pending backoff delay. A no-op while
    /// already connected.
    pub fn reconnect(&self) {
        if let Err(e) = self.cmd_tx.try_send(Command::Reconnect) {
            tracing::debug!(err = %e, "reconnect: supervisor already gone");
        }
    }

    /// Shared view of the connection state.
    #[must_use]
    pub fn state(&self) -> SharedConnectionState {
        self.state.clone()
    }

    /// Whether the transport is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.status() == ConnectionStatus::Connected
    }
}

/// Outcome of one connected phase, deciding what the supervisor does next.
enum Phase {
    /// The transport closed without the caller asking for it.
    UnexpectedClose,
    /// The caller disconnected (or dropped the handle); shut down.
    Shutdown,
}

/// Supervisor task: owns the socket lifecycle and the retry schedule.
async fn supervisor(
    url: Url,
    config: ReconnectConfig,
    state: SharedConnectionState,
    mut cmd_rx: mpsc::Receiver<Command>,
    evt_tx: mpsc::Sender<ConnectionEvent>,
) {
    loop {
        state.set_status(ConnectionStatus::Connecting);
        tracing::debug!(url = %url, attempt = state.attempt(), "connecting to room endpoint");

        let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await;
        match connect {
            Ok(Ok((ws_stream, _response))) => {
                state.on_connected();
                tracing::info!(url = %url, "room connection established");
                let _ = evt_tx.send(ConnectionEvent::Connected).await;

                let phase = connected_phase(ws_stream, &state, &mut cmd_rx, &evt_tx).await;

                state.set_status(ConnectionStatus::Disconnected);
                let _ = evt_tx.send(ConnectionEvent::Disconnected).await;

                if matches!(phase, Phase::Shutdown) {
                    tracing::info!("room connection closed by caller");
                    return;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %url, err = %e, "room connection attempt failed");
                state.record_error(e.to_string());
                state.set_status(ConnectionStatus::Disconnected);
            }
            Err(_) => {
                tracing::warn!(url = %url, "room connection attempt timed out");
                state.record_error("connection attempt timed out");
                state.set_status(ConnectionStatus::Disconnected);
            }
        }

        // Retry scheduling. One pending sleep, cancellable by Disconnect.
        let attempt = state.attempt();
        if attempt >= config.max_attempts {
            tracing::warn!(
                attempts = attempt,
                "max reconnect attempts reached; waiting for explicit reconnect"
            );
            state.record_error("max reconnect attempts reached");
            let _ = evt_tx.send(ConnectionEvent::ReconnectFailed).await;
            if !wait_for_manual_reconnect(&mut cmd_rx).await {
                return;
            }
            continue;
        }

        let delay = config.backoff_delay(attempt);
        state.increment_attempt();
        tracing::info!(
            attempt = attempt + 1,
            max = config.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        let _ = evt_tx
            .send(ConnectionEvent::Reconnecting {
                attempt: attempt + 1,
                delay,
            })
            .await;

        if !wait_out_backoff(delay, &mut cmd_rx).await {
            state.set_status(ConnectionStatus::Disconnected);
            tracing::info!("pending reconnect cancelled by disconnect");
            return;
        }
    }
}

/// Runs one open connection until it closes.
async fn connected_phase(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    state: &SharedConnectionState,
    cmd_rx: &mut mpsc::Receiver<Command>,
    evt_tx: &mpsc::Sender<ConnectionEvent>,
) -> Phase {
    let (mut ws_sender, mut ws_reader) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(event)) => {
                    let envelope = event.into_envelope();
                    match envelope::encode(&envelope) {
                        Ok(text) => {
                            if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                                tracing::warn!(err = %e, "send failed; treating as connection loss");
                                state.record_error(e.to_string());
                                return Phase::UnexpectedClose;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(err = %e, "failed to encode outbound envelope");
                        }
                    }
                }
                Some(Command::Reconnect) => {
                    // Already connected; nothing to do.
                }
                Some(Command::Disconnect) | None => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return Phase::Shutdown;
                }
            },
            frame = ws_reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_server_frame(text.as_str())
                        && evt_tx.send(ConnectionEvent::Event(event)).await.is_err()
                    {
                        // Event receiver dropped; behave like a shutdown.
                        return Phase::Shutdown;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("room connection closed by server");
                    return Phase::UnexpectedClose;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {
                    // Control and binary frames carry no envelopes.
                }
                Some(Err(e)) => {
                    tracing::warn!(err = %e, "room connection read error");
                    state.record_error(e.to_string());
                    return Phase::UnexpectedClose;
                }
                None => {
                    tracing::info!("room connection stream ended");
                    return Phase::UnexpectedClose;
                }
            },
        }
    }
}

/// Sleeps out the backoff delay while remaining cancellable.
///
/// Returns `true` to proceed with the retry, `false` when the caller
/// disconnected (or dropped the handle) during the wait. A `Reconnect`
/// command short-circuits the delay.
async fn wait_out_backoff(delay: Duration, cmd_rx: &mut mpsc::Receiver<Command>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Reconnect) => return true,
                Some(Command::Send(event)) => {
                    tracing::warn!(
                        event_type = event.event_type(),
                        "dropping outbound event: not connected"
                    );
                }
                Some(Command::Disconnect) | None => return false,
            },
        }
    }
}

/// Blocks in the terminal failure state until told what to do.
///
/// Returns `true` on an explicit reconnect request, `false` on
/// disconnect or handle drop.
async fn wait_for_manual_reconnect(cmd_rx: &mut mpsc::Receiver<Command>) -> bool {
    loop {
        match cmd_rx.recv().await {
            Some(Command::Reconnect) => return true,
            Some(Command::Send(event)) => {
                tracing::warn!(
                    event_type = event.event_type(),
                    "dropping outbound event: reconnect attempts exhausted"
                );
            }
            Some(Command::Disconnect) | None => return false,
        }
    }
}

/// Parses one inbound text frame into a typed server event.
///
/// Malformed frames and unknown event types are logged and dropped —
/// never fatal to the connection.
fn parse_server_frame(text: &str) -> Option<ServerEvent> {
    let envelope = match envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(err = %e, "dropping malformed frame");
            return None;
        }
    };
    match ServerEvent::from_envelope(&envelope) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(err = %e, "dropping unhandled event");
            None
        }
    }
}
