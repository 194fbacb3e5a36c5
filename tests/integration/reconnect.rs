// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::future_not_send,
    clippy::redundant_pub_crate
)]

//! Integration tests for automatic reconnection.
//!
//! These tests validate:
//! - The session reconnects automatically after the connection is severed
//! - Backoff delays follow the exponential schedule and cap
//! - The attempt counter resets after a successful reconnect
//! - Reconnection gives up after the attempt budget and resumes on an
//!   explicit `reconnect()`
//! - Intentional disconnects never schedule a retry
//! - Accumulated room state stays visible while disconnected
//!
//! ## Disconnect simulation
//!
//! Aborting the server's `JoinHandle` does not close existing WebSocket
//! connections (they live on independently-spawned tasks). Instead we
//! place a **TCP proxy** between the client and the real server. To
//! simulate a disconnect we abort all proxy connection tasks, which
//! immediately closes both ends of every proxied TCP connection.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use watchparty::connection::ReconnectConfig;
use watchparty::room::{RoomSession, SessionConfig, SessionEvent};

// =============================================================================
// TCP Proxy helper
// =============================================================================

/// A simple TCP proxy that forwards traffic between a client-facing port
/// and a backend (the real server). Calling `kill()` aborts all tracked
/// connection tasks, tearing down both directions of every proxied TCP
/// connection so the client's WebSocket layer detects a disconnect.
struct TcpProxy {
    /// Address clients should connect to (`127.0.0.1:<proxy_port>`).
    client_addr: String,
    /// The acceptor task handle.
    accept_handle: tokio::task::JoinHandle<()>,
    /// All per-connection task handles. Aborting these kills the streams.
    conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl TcpProxy {
    /// Create a new TCP proxy from `proxy_port` to `backend_addr`.
    async fn new(proxy_port: u16, backend_addr: &str) -> Self {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{proxy_port}"))
            .await
            .unwrap_or_else(|e| panic!("proxy: failed to bind to port {proxy_port}: {e}"));
        let bound_addr = listener.local_addr().unwrap();
        let client_addr = format!("127.0.0.1:{}", bound_addr.port());
        let backend = backend_addr.to_string();
        let conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let conn_handles_clone = Arc::clone(&conn_handles);

        let accept_handle = tokio::spawn(async move {
            loop {
                let Ok((mut client_stream, _)) = listener.accept().await else {
                    break;
                };

                let backend = backend.clone();
                let conn_handle = tokio::spawn(async move {
                    let Ok(mut backend_stream) = tokio::net::TcpStream::connect(&backend).await
                    else {
                        return;
                    };

                    // Copy bidirectionally. When this task is aborted,
                    // both streams are dropped immediately, causing RST
                    // on both ends. No sub-tasks so abort propagates.
                    let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut backend_stream)
                        .await;
                });

                conn_handles_clone.lock().push(conn_handle);
            }
        });

        Self {
            client_addr,
            accept_handle,
            conn_handles,
        }
    }

    /// Kill the proxy, severing all connections immediately.
    fn kill(self) {
        self.accept_handle.abort();
        let handles = self.conn_handles.lock();
        for h in handles.iter() {
            h.abort();
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Find a free port by binding to 0 and recording the port.
async fn find_free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to port 0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    // Brief pause to let the OS release the port.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

/// Start the room server on port 0, returning (addr string, handle).
async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = watchparty_server::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start room server");
    (addr.to_string(), handle)
}

/// A session config with fast reconnect settings for testing.
fn fast_session_config(proxy_addr: &str, max_attempts: u32) -> SessionConfig {
    let mut config = SessionConfig::new(format!("ws://{proxy_addr}"), "r1");
    config.token = Some("alice".to_string());
    config.reconnect = ReconnectConfig {
        base_interval: Duration::from_millis(100),
        max_delay: Duration::from_secs(5),
        max_attempts,
    };
    config
}

/// Wait for a session event matching a predicate, skipping others.
async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<SessionEvent>,
    timeout: Duration,
    description: &str,
    pred: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(event)) if pred(&event) => return event,
            Ok(Some(_other)) => {}
            Ok(None) => panic!("channel closed while waiting for {description}"),
            Err(_) => break,
        }
    }
    panic!("timeout waiting for {description}");
}

async fn wait_for_connected(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    wait_for_event(rx, Duration::from_secs(15), "Connected", |e| {
        matches!(e, SessionEvent::Connected)
    })
    .await
}

async fn wait_for_disconnected(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    wait_for_event(rx, Duration::from_secs(10), "Disconnected", |e| {
        matches!(e, SessionEvent::Disconnected)
    })
    .await
}

// =============================================================================
// Tests
// =============================================================================

/// After the connection is severed, the session reconnects through a
/// fresh proxy, the server re-sends `room:init`, and the attempt
/// counter resets. State accumulated before the sever stays visible
/// while disconnected.
#[tokio::test]
async fn reconnects_after_connection_severed() {
    let (server_addr, server) = start_server().await;
    let port = find_free_port().await;
    let proxy = TcpProxy::new(port, &server_addr).await;

    let (session, mut rx) = RoomSession::connect(fast_session_config(&proxy.client_addr, 10))
        .unwrap();
    wait_for_connected(&mut rx).await;

    session.send_message("before the sever");
    while session.snapshot().messages().is_empty() {
        wait_for_event(&mut rx, Duration::from_secs(10), "chat applied", |e| {
            matches!(e, SessionEvent::StateChanged)
        })
        .await;
    }

    proxy.kill();
    wait_for_disconnected(&mut rx).await;

    // Stale-but-present: the sever does not clear accumulated state.
    assert_eq!(session.snapshot().messages().len(), 1);

    wait_for_event(&mut rx, Duration::from_secs(10), "Reconnecting", |e| {
        matches!(e, SessionEvent::Reconnecting { .. })
    })
    .await;

    // Restore the path on the same port; a retry lands on the new proxy.
    let _proxy2 = TcpProxy::new(port, &server_addr).await;
    wait_for_connected(&mut rx).await;
    assert_eq!(session.connection_state().reconnect_attempt, 0);

    session.leave();
    server.abort();
}

/// Retry delays follow `min(base * 2^attempt, cap)`.
#[tokio::test]
async fn backoff_delays_follow_exponential_schedule() {
    // Nothing listens on this port: every attempt fails immediately.
    let port = find_free_port().await;
    let addr = format!("127.0.0.1:{port}");

    let (session, mut rx) = RoomSession::connect(fast_session_config(&addr, 6)).unwrap();

    let mut delays = Vec::new();
    while delays.len() < 5 {
        let event = wait_for_event(&mut rx, Duration::from_secs(15), "Reconnecting", |e| {
            matches!(e, SessionEvent::Reconnecting { .. })
        })
        .await;
        if let SessionEvent::Reconnecting { attempt, delay } = event {
            assert_eq!(attempt, u32::try_from(delays.len()).unwrap() + 1);
            delays.push(delay);
        }
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_millis(1600),
        ]
    );

    session.leave();
}

/// The configured cap bounds the exponential delay.
#[tokio::test]
async fn backoff_delay_is_capped() {
    let port = find_free_port().await;
    let addr = format!("127.0.0.1:{port}");
    let mut config = fast_session_config(&addr, 10);
    config.reconnect.max_delay = Duration::from_millis(250);

    let (session, mut rx) = RoomSession::connect(config).unwrap();

    let mut delays = Vec::new();
    while delays.len() < 4 {
        let event = wait_for_event(&mut rx, Duration::from_secs(15), "Reconnecting", |e| {
            matches!(e, SessionEvent::Reconnecting { .. })
        })
        .await;
        if let SessionEvent::Reconnecting { delay, .. } = event {
            delays.push(delay);
        }
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(250),
            Duration::from_millis(250),
        ]
    );

    session.leave();
}

/// After the attempt budget is exhausted the session reports terminal
/// failure and only an explicit `reconnect()` resumes.
#[tokio::test]
async fn gives_up_after_max_attempts_then_resumes_manually() {
    let port = find_free_port().await;
    let addr = format!("127.0.0.1:{port}");

    let (session, mut rx) = RoomSession::connect(fast_session_config(&addr, 2)).unwrap();
    wait_for_event(&mut rx, Duration::from_secs(15), "ReconnectFailed", |e| {
        matches!(e, SessionEvent::ReconnectFailed)
    })
    .await;
    assert!(!session.is_connected());
    assert!(session.connection_state().last_error.is_some());

    // No spontaneous retries in the terminal state.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(rx.try_recv().is_err());

    // Bring a server up on that port, then ask for a manual reconnect.
    let (_bound, server) = watchparty_server::server::start_server(&addr)
        .await
        .expect("failed to start room server");
    session.reconnect();
    wait_for_connected(&mut rx).await;

    session.leave();
    server.abort();
}

/// `leave()` tears the connection down without scheduling a retry.
#[tokio::test]
async fn intentional_disconnect_never_reconnects() {
    let (server_addr, server) = start_server().await;

    let (session, mut rx) = RoomSession::connect(fast_session_config(&server_addr, 10)).unwrap();
    wait_for_connected(&mut rx).await;

    session.leave();
    wait_for_disconnected(&mut rx).await;

    // The supervisor has shut down: no Reconnecting events follow and
    // the event channel closes.
    let next = tokio::time::timeout(Duration::from_millis(700), rx.recv()).await;
    match next {
        Ok(None) => {}
        Ok(Some(event)) => panic!("unexpected event after intentional disconnect: {event:?}"),
        Err(_) => {}
    }

    server.abort();
}
