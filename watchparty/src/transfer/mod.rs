//! Swarm transfer coordination.
//!
//! A [`TransferCoordinator`] manages one local swarm participation at a
//! time — seed a local file or download by swarm identifier, mutually
//! exclusive per coordinator — on top of a process-wide
//! [`SharedSwarmClient`]. Transfer statistics refresh on a fixed poll
//! interval, completion and failure arrive as swarm events, and a
//! playback-readiness gate reports when enough of the file is local to
//! sustain continuous read-ahead.

pub mod loopback;
pub mod shared;
pub mod swarm;
pub mod validate;

pub use shared::SharedSwarmClient;
pub use swarm::{LocalFile, SwarmError, SwarmStats, SwarmTransport, TransferId};
pub use validate::{ValidationError, validate_video_file};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use swarm::SwarmEvent;

/// Statistics refresh interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Playback readiness byte floor: 5 MiB.
pub const PLAYBACK_BYTE_FLOOR: u64 = 5 * 1024 * 1024;

/// WebSocket tracker endpoints used for peer discovery by default.
pub const DEFAULT_TRACKERS: [&str; 3] = [
    "wss://tracker.openwebtorrent.com",
    "wss://tracker.btorrent.xyz",
    "wss://tracker.fastcast.nz",
];

/// Bytes that must be local before playback may start: the larger of
/// the fixed floor and 2% of the file.
#[must_use]
pub const fn readiness_threshold(file_size: u64) -> u64 {
    let fraction = file_size / 50;
    if fraction > PLAYBACK_BYTE_FLOOR {
        fraction
    } else {
        PLAYBACK_BYTE_FLOOR
    }
}

/// Lifecycle of a coordinator's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferStatus {
    /// No transfer active.
    #[default]
    Idle,
    /// Publishing a local file.
    Seeding,
    /// Fetching a remote swarm's content.
    Downloading,
    /// Download complete, full file local.
    Ready,
    /// The transfer failed; detail in [`TransferState::error`].
    Error,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Seeding => write!(f, "seeding"),
            Self::Downloading => write!(f, "downloading"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Observable state of one transfer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferState {
    /// Current lifecycle status.
    pub status: TransferStatus,
    /// Fraction of the file locally available, in `[0, 1]`.
    pub progress: f64,
    /// Download rate in bytes per second.
    pub download_speed: f64,
    /// Upload rate in bytes per second.
    pub upload_speed: f64,
    /// Total bytes downloaded.
    pub downloaded: u64,
    /// Total bytes uploaded.
    pub uploaded: u64,
    /// Connected peer count.
    pub num_peers: usize,
    /// Magnet-style identifier, once the swarm assigns one.
    pub swarm_id: Option<String>,
    /// Content info hash, once assigned.
    pub info_hash: Option<String>,
    /// Name of the transferred file.
    pub file_name: Option<String>,
    /// Size of the transferred file in bytes.
    pub file_size: u64,
    /// Failure detail when `status` is [`TransferStatus::Error`].
    pub error: Option<String>,
}

impl TransferState {
    /// Whether enough of the file is local to begin playback.
    ///
    /// True once progress reaches 1 or the downloaded bytes pass
    /// [`readiness_threshold`]. For small files whose size is under the
    /// byte floor, only completion satisfies the gate.
    #[must_use]
    pub fn playback_ready(&self) -> bool {
        match self.status {
            TransferStatus::Idle | TransferStatus::Error => false,
            TransferStatus::Ready => true,
            TransferStatus::Seeding | TransferStatus::Downloading => {
                self.progress >= 1.0 || self.downloaded >= readiness_threshold(self.file_size)
            }
        }
    }
}

/// Identifier and metadata returned when a transfer registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInfo {
    /// Magnet-style identifier other peers use to join.
    pub swarm_id: String,
    /// Content info hash.
    pub info_hash: String,
    /// File name.
    pub file_name: String,
    /// File size in bytes.
    pub file_size: u64,
}

/// Errors from coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The coordinator already has an active transfer.
    #[error("transfer already active (status: {0})")]
    Busy(TransferStatus),

    /// The swarm layer rejected the operation.
    #[error(transparent)]
    Swarm(#[from] SwarmError),
}

struct ActiveTransfer {
    id: TransferId,
    poller: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

/// Coordinates one seed or download over the shared swarm client.
pub struct TransferCoordinator<T: SwarmTransport> {
    client: SharedSwarmClient<T>,
    state: Arc<Mutex<TransferState>>,
    active: Mutex<Option<ActiveTransfer>>,
}

impl<T: SwarmTransport> std::fmt::Debug for TransferCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferCoordinator")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<T: SwarmTransport> TransferCoordinator<T> {
    /// Create an idle coordinator over an injected shared client.
    #[must_use]
    pub fn new(client: SharedSwarmClient<T>) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(TransferState::default())),
            active: Mutex::new(None),
        }
    }

    /// Publish a local file to the swarm.
    ///
    /// Validation of the file is the caller's responsibility (see
    /// [`validate_video_file`]). Resolves once the swarm assigns an
    /// identifier; seeding progress is 1 from the start since the full
    /// file is local.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] when a transfer is already active;
    /// [`TransferError::Swarm`] when client init or registration fails
    /// (status transitions to `error` with the detail retained).
    pub async fn seed_file(&self, file: LocalFile) -> Result<TransferInfo, TransferError> {
        self.begin(TransferStatus::Seeding)?;
        tracing::info!(file = %file.name, size = file.size, "seeding file");

        let client = self.try_swarm(self.client.get_or_init().await)?;
        let ticket = self.try_swarm(client.seed(file).await)?;
        Ok(self.adopt(client, ticket, TransferStatus::Seeding))
    }

    /// Join a swarm by magnet-style identifier and download its content.
    ///
    /// Resolves on join; completion is observed via state (status
    /// `ready`, progress 1) or the readiness gate.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] when a transfer is already active;
    /// [`TransferError::Swarm`] when client init or the join fails.
    pub async fn download(&self, swarm_id: &str) -> Result<TransferInfo, TransferError> {
        self.begin(TransferStatus::Downloading)?;
        tracing::info!(swarm_id, "joining swarm");

        let client = self.try_swarm(self.client.get_or_init().await)?;
        let ticket = self.try_swarm(client.join(swarm_id).await)?;
        Ok(self.adopt(client, ticket, TransferStatus::Downloading))
    }

    /// Stop the active transfer: cancel the poller and event watcher,
    /// remove the transfer from the swarm client, reset to idle.
    ///
    /// The shared client itself stays alive; other coordinators may
    /// hold transfers on it. Idempotent.
    pub async fn stop(&self) {
        let active = self.active.lock().take();
        if let Some(active) = active {
            active.poller.abort();
            active.watcher.abort();
            if let Some(client) = self.client.current().await
                && let Err(e) = client.remove(&active.id).await
            {
                tracing::warn!(err = %e, transfer = %active.id, "failed to remove transfer");
            }
        }
        *self.state.lock() = TransferState::default();
    }

    /// Snapshot of the transfer state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state.lock().clone()
    }

    /// Identifier of the active transfer inside the swarm client.
    #[must_use]
    pub fn transfer_id(&self) -> Option<TransferId> {
        self.active.lock().as_ref().map(|active| active.id.clone())
    }

    /// Whether the readiness gate currently passes.
    #[must_use]
    pub fn playback_ready(&self) -> bool {
        self.state.lock().playback_ready()
    }

    /// Gate: only an idle coordinator may start a transfer.
    fn begin(&self, status: TransferStatus) -> Result<(), TransferError> {
        let mut state = self.state.lock();
        if state.status != TransferStatus::Idle {
            return Err(TransferError::Busy(state.status));
        }
        *state = TransferState {
            status,
            ..TransferState::default()
        };
        Ok(())
    }

    /// On swarm failure, park the coordinator in `error` with detail.
    fn try_swarm<V>(&self, result: Result<V, SwarmError>) -> Result<V, TransferError> {
        result.map_err(|e| {
            tracing::warn!(err = %e, "swarm operation failed");
            let mut state = self.state.lock();
            state.status = TransferStatus::Error;
            state.error = Some(e.to_string());
            TransferError::Swarm(e)
        })
    }

    /// Record the assigned identifier and spawn the poller and event
    /// watcher for the registered transfer.
    fn adopt(
        &self,
        client: Arc<T>,
        ticket: swarm::SwarmTicket,
        status: TransferStatus,
    ) -> TransferInfo {
        let info = TransferInfo {
            swarm_id: ticket.magnet_uri,
            info_hash: ticket.info_hash,
            file_name: ticket.file_name,
            file_size: ticket.file_size,
        };

        {
            let mut state = self.state.lock();
            state.swarm_id = Some(info.swarm_id.clone());
            state.info_hash = Some(info.info_hash.clone());
            state.file_name = Some(info.file_name.clone());
            state.file_size = info.file_size;
            if status == TransferStatus::Seeding {
                state.progress = 1.0;
                state.downloaded = info.file_size;
            }
        }

        let poller = tokio::spawn(poll_stats(client, ticket.id.clone(), Arc::clone(&self.state)));
        let watcher = tokio::spawn(watch_events(ticket.events, Arc::clone(&self.state)));
        *self.active.lock() = Some(ActiveTransfer {
            id: ticket.id,
            poller,
            watcher,
        });
        info
    }
}

impl<T: SwarmTransport> Drop for TransferCoordinator<T> {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.poller.abort();
            active.watcher.abort();
        }
    }
}

/// Periodic statistics refresh. Exactly one runs per live transfer;
/// cancelled by `stop` or coordinator drop.
async fn poll_stats<T: SwarmTransport>(
    client: Arc<T>,
    id: TransferId,
    state: Arc<Mutex<TransferState>>,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        match client.stats(&id) {
            Ok(stats) => {
                let mut state = state.lock();
                match state.status {
                    TransferStatus::Seeding | TransferStatus::Downloading | TransferStatus::Ready => {}
                    TransferStatus::Idle | TransferStatus::Error => break,
                }
                state.download_speed = stats.download_speed;
                state.upload_speed = stats.upload_speed;
                state.uploaded = stats.uploaded;
                state.num_peers = stats.num_peers;
                if state.status == TransferStatus::Downloading {
                    state.progress = stats.progress;
                    state.downloaded = stats.downloaded;
                }
            }
            Err(e) => {
                tracing::debug!(err = %e, transfer = %id, "stats poll ended");
                break;
            }
        }
    }
}

/// Applies swarm lifecycle events to the transfer state.
async fn watch_events(mut events: mpsc::Receiver<SwarmEvent>, state: Arc<Mutex<TransferState>>) {
    while let Some(event) = events.recv().await {
        match event {
            SwarmEvent::Completed => {
                let mut state = state.lock();
                if state.status == TransferStatus::Downloading {
                    state.status = TransferStatus::Ready;
                    state.progress = 1.0;
                    state.downloaded = state.file_size;
                    state.download_speed = 0.0;
                    tracing::info!(file = state.file_name.as_deref(), "download complete");
                }
            }
            SwarmEvent::Failed(detail) => {
                tracing::warn!(detail = %detail, "transfer failed");
                let mut state = state.lock();
                state.status = TransferStatus::Error;
                state.error = Some(detail);
                break;
            }
        }
    }
}
