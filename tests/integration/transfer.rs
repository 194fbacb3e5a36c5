// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::future_not_send,
    clippy::redundant_pub_crate
)]

//! End-to-end swarm transfer tests over the loopback swarm client.
//!
//! Two coordinators share one swarm client, as two features of the same
//! process would: one seeds a local file, the other joins by magnet URI
//! and downloads. Tests drive the loopback client's counters directly
//! and observe the coordinators through their polled state.
//!
//! All tests run with paused time so the 1-second statistics poll
//! advances instantly.

use watchparty::transfer::loopback::LoopbackSwarm;
use watchparty::transfer::{
    LocalFile, POLL_INTERVAL, SharedSwarmClient, TransferCoordinator, TransferId, TransferStatus,
    readiness_threshold,
};

/// 500 MiB: large enough that the readiness threshold is the 2%
/// fraction (10 MiB), not the byte floor.
const LARGE_FILE: u64 = 500 * 1024 * 1024;

fn shared_client() -> SharedSwarmClient<LoopbackSwarm> {
    SharedSwarmClient::new(|| async { Ok(LoopbackSwarm::new()) })
}

/// Seed `file` on one coordinator and start a download of it on a
/// second coordinator over the same shared client. Returns both
/// coordinators plus the downloader's transfer id for driving.
async fn seed_and_join(
    shared: &SharedSwarmClient<LoopbackSwarm>,
    file: LocalFile,
) -> (
    TransferCoordinator<LoopbackSwarm>,
    TransferCoordinator<LoopbackSwarm>,
    TransferId,
) {
    let seeder = TransferCoordinator::new(shared.clone());
    let info = seeder.seed_file(file).await.unwrap();

    let downloader = TransferCoordinator::new(shared.clone());
    downloader.download(&info.swarm_id).await.unwrap();
    let id = downloader.transfer_id().unwrap();
    (seeder, downloader, id)
}

/// Wait (in virtual time) until the coordinator's state satisfies a
/// predicate.
async fn wait_for_state<F>(coordinator: &TransferCoordinator<LoopbackSwarm>, description: &str, pred: F)
where
    F: Fn(&watchparty::transfer::TransferState) -> bool,
{
    for _ in 0..20 {
        if pred(&coordinator.state()) {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!(
        "timeout waiting for {description}; last state: {:?}",
        coordinator.state()
    );
}

#[tokio::test(start_paused = true)]
async fn download_progress_flows_through_polling() {
    let shared = shared_client();
    let (seeder, downloader, id) = seed_and_join(&shared, LocalFile::new("movie.mp4", LARGE_FILE)).await;
    let swarm = shared.get_or_init().await.unwrap();

    let state = downloader.state();
    assert_eq!(state.status, TransferStatus::Downloading);
    assert_eq!(state.downloaded, 0);
    assert_eq!(state.file_size, LARGE_FILE);

    swarm.advance_download(&id, LARGE_FILE / 4).unwrap();
    swarm.set_peers(&id, 3).unwrap();
    swarm.set_speeds(&id, 1_500_000.0, 80_000.0).unwrap();

    wait_for_state(&downloader, "quarter downloaded", |s| {
        s.downloaded == LARGE_FILE / 4
    })
    .await;
    let state = downloader.state();
    assert!((state.progress - 0.25).abs() < 1e-9);
    assert_eq!(state.num_peers, 3);
    assert!((state.download_speed - 1_500_000.0).abs() < f64::EPSILON);
    assert!((state.upload_speed - 80_000.0).abs() < f64::EPSILON);

    downloader.stop().await;
    seeder.stop().await;
}

#[tokio::test(start_paused = true)]
async fn readiness_gate_opens_at_threshold() {
    let shared = shared_client();
    let (seeder, downloader, id) = seed_and_join(&shared, LocalFile::new("movie.mp4", LARGE_FILE)).await;
    let swarm = shared.get_or_init().await.unwrap();

    let threshold = readiness_threshold(LARGE_FILE);
    assert_eq!(threshold, LARGE_FILE / 50);

    swarm.advance_download(&id, threshold - 1).unwrap();
    wait_for_state(&downloader, "bytes below threshold", |s| {
        s.downloaded == threshold - 1
    })
    .await;
    assert!(!downloader.playback_ready());

    swarm.advance_download(&id, 1).unwrap();
    wait_for_state(&downloader, "bytes at threshold", |s| {
        s.downloaded == threshold
    })
    .await;
    assert!(downloader.playback_ready());
    // The gate opened well before completion.
    assert_eq!(downloader.state().status, TransferStatus::Downloading);
    assert!(downloader.state().progress < 1.0);

    downloader.stop().await;
    seeder.stop().await;
}

#[tokio::test(start_paused = true)]
async fn completion_transitions_to_ready() {
    let shared = shared_client();
    let (seeder, downloader, id) = seed_and_join(&shared, LocalFile::new("movie.mp4", LARGE_FILE)).await;
    let swarm = shared.get_or_init().await.unwrap();

    swarm.advance_download(&id, LARGE_FILE).unwrap();
    wait_for_state(&downloader, "download complete", |s| {
        s.status == TransferStatus::Ready
    })
    .await;

    let state = downloader.state();
    assert!((state.progress - 1.0).abs() < f64::EPSILON);
    assert_eq!(state.downloaded, LARGE_FILE);
    assert!((state.download_speed).abs() < f64::EPSILON);
    assert!(downloader.playback_ready());

    downloader.stop().await;
    seeder.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failure_is_isolated_to_one_coordinator() {
    let shared = shared_client();
    let (seeder, downloader, id) = seed_and_join(&shared, LocalFile::new("movie.mp4", LARGE_FILE)).await;
    let swarm = shared.get_or_init().await.unwrap();

    swarm.fail_transfer(&id, "tracker timeout").unwrap();
    wait_for_state(&downloader, "failure observed", |s| {
        s.status == TransferStatus::Error
    })
    .await;
    assert_eq!(downloader.state().error.as_deref(), Some("tracker timeout"));
    assert!(!downloader.playback_ready());

    // The seeder on the same shared client is untouched.
    let seeder_state = seeder.state();
    assert_eq!(seeder_state.status, TransferStatus::Seeding);
    assert!(seeder.playback_ready());

    downloader.stop().await;
    seeder.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_releases_the_transfer_but_not_the_publication() {
    let shared = shared_client();
    let seeder = TransferCoordinator::new(shared.clone());
    let info = seeder
        .seed_file(LocalFile::new("movie.mp4", LARGE_FILE))
        .await
        .unwrap();
    let swarm = shared.get_or_init().await.unwrap();

    let downloader = TransferCoordinator::new(shared.clone());
    downloader.download(&info.swarm_id).await.unwrap();
    assert_eq!(swarm.active_transfers(), 2);

    downloader.stop().await;
    assert_eq!(swarm.active_transfers(), 1);
    assert_eq!(downloader.state().status, TransferStatus::Idle);
    assert!(downloader.transfer_id().is_none());

    // The content is still published: a fresh download joins fine and
    // the same coordinator may go again after stopping.
    downloader.download(&info.swarm_id).await.unwrap();
    assert_eq!(downloader.state().status, TransferStatus::Downloading);

    downloader.stop().await;
    seeder.stop().await;
    assert_eq!(swarm.active_transfers(), 0);
}

#[tokio::test(start_paused = true)]
async fn coordinators_share_one_client_instance() {
    let shared = shared_client();
    let (seeder, downloader, _id) = seed_and_join(&shared, LocalFile::new("movie.mp4", LARGE_FILE)).await;

    // Both participations landed on the same underlying client.
    let swarm = shared.get_or_init().await.unwrap();
    assert_eq!(swarm.active_transfers(), 2);

    downloader.stop().await;
    seeder.stop().await;
}
