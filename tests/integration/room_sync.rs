// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::future_not_send,
    clippy::redundant_pub_crate
)]

//! End-to-end room synchronization tests against an in-process server.
//!
//! These tests validate:
//! - Joining delivers the authoritative `room:init` snapshot
//! - Chat messages fan out to every session's reconciled state
//! - Host playback controls drive every member's mirrored video state
//! - Members without control permission are rejected server-side, and
//!   dropped client-side once the local participant id is known
//! - `video:change` resets playback state everywhere
//! - Leaving updates the remaining sessions' rosters

use std::time::Duration;

use tokio::sync::mpsc;
use watchparty::room::{RoomSession, RoomState, SessionConfig, SessionEvent, VideoControl};

/// Start the room server on an OS-assigned port.
async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = watchparty_server::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start room server");
    (format!("ws://{addr}"), handle)
}

/// Join a room as `username`, waiting until the session is connected.
async fn join(
    base_url: &str,
    room: &str,
    username: &str,
) -> (RoomSession, mpsc::Receiver<SessionEvent>) {
    let mut config = SessionConfig::new(base_url, room);
    config.token = Some(username.to_string());
    let (session, mut events) = RoomSession::connect(config).unwrap();
    wait_for_event(&mut events, "Connected", |e| {
        matches!(e, SessionEvent::Connected)
    })
    .await;
    (session, events)
}

/// Wait for a session event matching a predicate, skipping others.
async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<SessionEvent>,
    description: &str,
    pred: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
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

/// Drain state-change events until the snapshot satisfies a predicate.
async fn wait_for_state<F>(
    session: &RoomSession,
    rx: &mut mpsc::Receiver<SessionEvent>,
    description: &str,
    pred: F,
) -> RoomState
where
    F: Fn(&RoomState) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = session.snapshot();
        if pred(&snapshot) {
            return snapshot;
        }
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("timeout waiting for {description}"));
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(_)) => {}
            Ok(None) => panic!("channel closed while waiting for {description}"),
            Err(_) => panic!("timeout waiting for {description}"),
        }
    }
}

/// Find a participant id by username in a session's snapshot.
fn id_of(state: &RoomState, username: &str) -> String {
    state
        .participants()
        .iter()
        .find(|p| p.username == username)
        .map(|p| p.id.clone())
        .unwrap_or_else(|| panic!("no participant named {username}"))
}

#[tokio::test]
async fn join_receives_initial_snapshot() {
    let (base_url, server) = start_server().await;
    let (alice, mut alice_rx) = join(&base_url, "r1", "alice").await;

    let state = wait_for_state(&alice, &mut alice_rx, "roster with alice", |s| {
        s.participants().len() == 1
    })
    .await;
    assert_eq!(state.participants()[0].username, "alice");
    assert!(state.participants()[0].has_control_permission);
    assert!(state.video().is_some());

    alice.leave();
    server.abort();
}

#[tokio::test]
async fn chat_propagates_to_all_sessions() {
    let (base_url, server) = start_server().await;
    let (alice, mut alice_rx) = join(&base_url, "r1", "alice").await;
    let (bob, mut bob_rx) = join(&base_url, "r1", "bob").await;

    alice.send_message("movie night!");

    for (session, rx, who) in [
        (&alice, &mut alice_rx, "alice"),
        (&bob, &mut bob_rx, "bob"),
    ] {
        let state = wait_for_state(session, rx, "chat visible", |s| !s.messages().is_empty()).await;
        let message = &state.messages()[0];
        assert_eq!(message.content, "movie night!", "{who}");
        assert_eq!(message.username, "alice", "{who}");
        assert!(message.is_host, "{who}");
    }

    alice.leave();
    bob.leave();
    server.abort();
}

#[tokio::test]
async fn host_controls_drive_member_playback_state() {
    let (base_url, server) = start_server().await;
    let (alice, _alice_rx) = join(&base_url, "r1", "alice").await;
    let (bob, mut bob_rx) = join(&base_url, "r1", "bob").await;

    alice.send_video_control(VideoControl::Seek(42.5));
    let state = wait_for_state(&bob, &mut bob_rx, "seek applied", |s| {
        s.video().is_some_and(|v| v.current_time > 42.0)
    })
    .await;
    assert!(!state.video().unwrap().is_playing);

    alice.send_video_control(VideoControl::Play);
    wait_for_state(&bob, &mut bob_rx, "play applied", |s| {
        s.video().is_some_and(|v| v.is_playing)
    })
    .await;

    alice.leave();
    bob.leave();
    server.abort();
}

#[tokio::test]
async fn member_without_permission_is_rejected_server_side() {
    let (base_url, server) = start_server().await;
    let (alice, _alice_rx) = join(&base_url, "r1", "alice").await;
    let (bob, mut bob_rx) = join(&base_url, "r1", "bob").await;

    // No local participant id set: the intent goes out and the server
    // answers with an error event instead of a broadcast.
    bob.send_video_control(VideoControl::Play);
    let event = wait_for_event(&mut bob_rx, "server error", |e| {
        matches!(e, SessionEvent::ServerError { .. })
    })
    .await;
    let SessionEvent::ServerError { code, .. } = event else {
        unreachable!();
    };
    assert_eq!(code, "NO_CONTROL_PERMISSION");
    assert!(bob.snapshot().video().is_none_or(|v| !v.is_playing));

    alice.leave();
    bob.leave();
    server.abort();
}

#[tokio::test]
async fn client_side_gate_drops_unauthorized_intent() {
    let (base_url, server) = start_server().await;
    let (alice, _alice_rx) = join(&base_url, "r1", "alice").await;
    let (bob, mut bob_rx) = join(&base_url, "r1", "bob").await;

    let state = wait_for_state(&bob, &mut bob_rx, "full roster", |s| {
        s.participants().len() == 2
    })
    .await;
    bob.set_local_participant(id_of(&state, "bob"));

    // The gate drops the intent before transmission: no server error,
    // no playback change.
    bob.send_video_control(VideoControl::Play);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(bob_rx.try_recv().is_err());
    assert!(bob.snapshot().video().is_none_or(|v| !v.is_playing));

    alice.leave();
    bob.leave();
    server.abort();
}

#[tokio::test]
async fn video_change_resets_playback_everywhere() {
    let (base_url, server) = start_server().await;
    let (alice, _alice_rx) = join(&base_url, "r1", "alice").await;
    let (bob, mut bob_rx) = join(&base_url, "r1", "bob").await;

    alice.send_video_control(VideoControl::Seek(250.0));
    wait_for_state(&bob, &mut bob_rx, "seek applied", |s| {
        s.video().is_some_and(|v| v.current_time > 249.0)
    })
    .await;

    alice.change_video("episode-2");
    let state = wait_for_state(&bob, &mut bob_rx, "reset applied", |s| {
        s.video().is_some_and(|v| v.current_time < 1.0)
    })
    .await;
    let video = state.video().unwrap();
    assert!(!video.is_playing);
    assert!((video.playback_rate - 1.0).abs() < f64::EPSILON);

    alice.leave();
    bob.leave();
    server.abort();
}

#[tokio::test]
async fn leaving_updates_remaining_rosters() {
    let (base_url, server) = start_server().await;
    let (alice, mut alice_rx) = join(&base_url, "r1", "alice").await;
    let (bob, _bob_rx) = join(&base_url, "r1", "bob").await;

    wait_for_state(&alice, &mut alice_rx, "full roster", |s| {
        s.participants().len() == 2
    })
    .await;

    bob.leave();
    let state = wait_for_state(&alice, &mut alice_rx, "bob removed", |s| {
        s.participants().len() == 1
    })
    .await;
    assert_eq!(state.participants()[0].username, "alice");

    alice.leave();
    server.abort();
}
