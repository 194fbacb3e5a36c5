//! In-process swarm client for testing.
//!
//! [`LoopbackSwarm`] keeps published content in a process-local
//! registry: seeding registers a file, joining looks it up by magnet
//! URI. Download progress does not advance on its own — tests drive it
//! through [`advance_download`](LoopbackSwarm::advance_download),
//! [`set_peers`](LoopbackSwarm::set_peers) and
//! [`fail_transfer`](LoopbackSwarm::fail_transfer).

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::swarm::{
    LocalFile, SwarmError, SwarmEvent, SwarmStats, SwarmTicket, SwarmTransport, TransferId,
};

/// Capacity of each transfer's event channel.
const EVENT_BUFFER: usize = 8;

struct Entry {
    stats: SwarmStats,
    file_name: String,
    file_size: u64,
    magnet_uri: String,
    /// Seeding entries unpublish the content on removal; downloading
    /// entries leave the publication alone.
    seeder: bool,
    events: mpsc::Sender<SwarmEvent>,
}

/// Swarm client backed by an in-process content registry.
#[derive(Default)]
pub struct LoopbackSwarm {
    transfers: Mutex<HashMap<TransferId, Entry>>,
    /// Published content, keyed by magnet URI: info hash plus metadata.
    published: Mutex<HashMap<String, (String, String, u64)>>,
}

impl LoopbackSwarm {
    /// Create an empty loopback swarm client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance a downloading transfer by `bytes`.
    ///
    /// Progress is recomputed from the byte counter; reaching the full
    /// file size emits [`SwarmEvent::Completed`].
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoSuchTransfer`] for unknown ids.
    pub fn advance_download(&self, id: &TransferId, bytes: u64) -> Result<(), SwarmError> {
        let completed_tx = {
            let mut transfers = self.transfers.lock();
            let entry = transfers
                .get_mut(id)
                .ok_or_else(|| SwarmError::NoSuchTransfer(id.clone()))?;
            entry.stats.downloaded = entry.stats.downloaded.saturating_add(bytes);
            if entry.stats.downloaded >= entry.file_size {
                entry.stats.downloaded = entry.file_size;
                entry.stats.progress = 1.0;
                entry.stats.download_speed = 0.0;
                Some(entry.events.clone())
            } else {
                entry.stats.progress = ratio(entry.stats.downloaded, entry.file_size);
                None
            }
        };
        if let Some(tx) = completed_tx {
            let _ = tx.try_send(SwarmEvent::Completed);
        }
        Ok(())
    }

    /// Set the connected peer count for a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoSuchTransfer`] for unknown ids.
    pub fn set_peers(&self, id: &TransferId, num_peers: usize) -> Result<(), SwarmError> {
        let mut transfers = self.transfers.lock();
        let entry = transfers
            .get_mut(id)
            .ok_or_else(|| SwarmError::NoSuchTransfer(id.clone()))?;
        entry.stats.num_peers = num_peers;
        Ok(())
    }

    /// Set the transfer rates reported for a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoSuchTransfer`] for unknown ids.
    pub fn set_speeds(&self, id: &TransferId, down: f64, up: f64) -> Result<(), SwarmError> {
        let mut transfers = self.transfers.lock();
        let entry = transfers
            .get_mut(id)
            .ok_or_else(|| SwarmError::NoSuchTransfer(id.clone()))?;
        entry.stats.download_speed = down;
        entry.stats.upload_speed = up;
        Ok(())
    }

    /// Fail a transfer, emitting [`SwarmEvent::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoSuchTransfer`] for unknown ids.
    pub fn fail_transfer(&self, id: &TransferId, detail: &str) -> Result<(), SwarmError> {
        let tx = {
            let transfers = self.transfers.lock();
            transfers
                .get(id)
                .map(|entry| entry.events.clone())
                .ok_or_else(|| SwarmError::NoSuchTransfer(id.clone()))?
        };
        let _ = tx.try_send(SwarmEvent::Failed(detail.to_string()));
        Ok(())
    }

    /// Number of transfers currently registered.
    #[must_use]
    pub fn active_transfers(&self) -> usize {
        self.transfers.lock().len()
    }

    fn register(
        &self,
        info_hash: String,
        magnet_uri: String,
        file_name: String,
        file_size: u64,
        seeder: bool,
        stats: SwarmStats,
    ) -> SwarmTicket {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        // Per-participation id: a seeder and a downloader of the same
        // content on one client must not collide.
        let id = TransferId::new(uuid::Uuid::now_v7().simple().to_string());
        self.transfers.lock().insert(
            id.clone(),
            Entry {
                stats,
                file_name: file_name.clone(),
                file_size,
                magnet_uri: magnet_uri.clone(),
                seeder,
                events: events_tx,
            },
        );
        SwarmTicket {
            id,
            magnet_uri,
            info_hash,
            file_name,
            file_size,
            events: events_rx,
        }
    }
}

impl SwarmTransport for LoopbackSwarm {
    async fn seed(&self, file: LocalFile) -> Result<SwarmTicket, SwarmError> {
        let info_hash = uuid::Uuid::now_v7().simple().to_string();
        let magnet_uri = format!("magnet:?xt=urn:btih:{info_hash}&dn={}", file.name);
        self.published.lock().insert(
            magnet_uri.clone(),
            (info_hash.clone(), file.name.clone(), file.size),
        );

        // A seeder holds the complete file from the start.
        let stats = SwarmStats {
            progress: 1.0,
            downloaded: file.size,
            ..SwarmStats::default()
        };
        Ok(self.register(info_hash, magnet_uri, file.name, file.size, true, stats))
    }

    async fn join(&self, swarm_id: &str) -> Result<SwarmTicket, SwarmError> {
        let (info_hash, file_name, file_size) = self
            .published
            .lock()
            .get(swarm_id)
            .cloned()
            .ok_or_else(|| SwarmError::UnknownSwarm(swarm_id.to_string()))?;

        Ok(self.register(
            info_hash,
            swarm_id.to_string(),
            file_name,
            file_size,
            false,
            SwarmStats::default(),
        ))
    }

    fn stats(&self, id: &TransferId) -> Result<SwarmStats, SwarmError> {
        self.transfers
            .lock()
            .get(id)
            .map(|entry| entry.stats)
            .ok_or_else(|| SwarmError::NoSuchTransfer(id.clone()))
    }

    async fn remove(&self, id: &TransferId) -> Result<(), SwarmError> {
        // Removing twice is a no-op by contract.
        if let Some(entry) = self.transfers.lock().remove(id)
            && entry.seeder
        {
            self.published.lock().remove(&entry.magnet_uri);
        }
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        downloaded as f64 / total as f64
    }
}
