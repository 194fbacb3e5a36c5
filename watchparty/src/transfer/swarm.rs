//! Swarm transport abstraction.
//!
//! Defines the [`SwarmTransport`] trait the coordinator drives. The
//! trait covers peer discovery and chunked transfer as an external
//! concern; implementations never interpret file contents. The
//! in-process [`LoopbackSwarm`](super::loopback::LoopbackSwarm) backs
//! tests with deterministic, drivable progress.

use std::fmt;

use tokio::sync::mpsc;

/// Unique identifier for one active transfer inside a swarm client.
///
/// Opaque to the coordinator; only the owning swarm client interprets
/// it. Two participations in the same swarm get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferId(String);

impl TransferId {
    /// Create a transfer identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the string representation of this transfer id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A local file offered for seeding.
///
/// Carries metadata only; the swarm client reads content itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// File name, including extension.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

impl LocalFile {
    /// Create a file descriptor from name and size.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Instantaneous counters for one transfer, refreshed by polling.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwarmStats {
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
}

/// Lifecycle events a swarm client pushes for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmEvent {
    /// The transfer holds the complete file locally.
    Completed,
    /// The transfer failed; detail is client-specific.
    Failed(String),
}

/// Handle returned when a transfer is registered with a swarm client.
///
/// Resolving `seed`/`join` means the swarm assigned an identifier, not
/// that the transfer finished — the remainder is observed through
/// [`SwarmStats`] polling and the event receiver.
#[derive(Debug)]
pub struct SwarmTicket {
    /// Identifier of the registered transfer.
    pub id: TransferId,
    /// Magnet-style URI other peers use to join.
    pub magnet_uri: String,
    /// Content info hash.
    pub info_hash: String,
    /// Name of the transferred file.
    pub file_name: String,
    /// Size of the transferred file in bytes.
    pub file_size: u64,
    /// Lifecycle events for this transfer.
    pub events: mpsc::Receiver<SwarmEvent>,
}

/// Errors from the swarm layer.
///
/// Terminal for the affected transfer only; the shared client and any
/// other concurrent transfers are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    /// The client could not be initialized.
    #[error("swarm client initialization failed: {0}")]
    Init(String),

    /// No published content matches the given identifier.
    #[error("unknown swarm identifier: {0}")]
    UnknownSwarm(String),

    /// The transfer id is not registered with this client.
    #[error("no such transfer: {0}")]
    NoSuchTransfer(TransferId),

    /// The client rejected or aborted the transfer.
    #[error("swarm transfer failed: {0}")]
    Transfer(String),
}

/// Async swarm client trait: publish, join, observe, remove.
///
/// One client instance backs many concurrent transfers; implementations
/// must keep per-transfer state isolated so a failure in one transfer
/// never disturbs another.
pub trait SwarmTransport: Send + Sync + 'static {
    /// Publish a local file to the swarm.
    ///
    /// Resolves once the swarm assigns an identifier for the content.
    fn seed(
        &self,
        file: LocalFile,
    ) -> impl std::future::Future<Output = Result<SwarmTicket, SwarmError>> + Send;

    /// Join an existing swarm by magnet-style identifier.
    ///
    /// Resolves once the client has located the content's metadata.
    fn join(
        &self,
        swarm_id: &str,
    ) -> impl std::future::Future<Output = Result<SwarmTicket, SwarmError>> + Send;

    /// Current counters for a registered transfer.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoSuchTransfer`] when the id is unknown.
    fn stats(&self, id: &TransferId) -> Result<SwarmStats, SwarmError>;

    /// Remove a transfer from the client, releasing its resources.
    ///
    /// Removing an already-removed transfer is a no-op.
    fn remove(
        &self,
        id: &TransferId,
    ) -> impl std::future::Future<Output = Result<(), SwarmError>> + Send;
}
