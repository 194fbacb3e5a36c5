//! Process-wide swarm client sharing.
//!
//! One swarm client backs every transfer in the process. The client is
//! expensive to construct, so it is built lazily on first use with at
//! most one initialization in flight: concurrent callers await the same
//! build instead of racing their own. Components receive a
//! [`SharedSwarmClient`] handle by injection; nothing reaches for an
//! ambient global.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::swarm::{SwarmError, SwarmTransport};

type Builder<T> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, SwarmError>> + Send>> + Send + Sync>;

struct Inner<T> {
    // Held across the build await: the second caller blocks on the lock
    // and then finds the slot populated.
    slot: Mutex<Option<Arc<T>>>,
    builder: Builder<T>,
}

/// Cloneable handle to the lazily-built, process-wide swarm client.
pub struct SharedSwarmClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedSwarmClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SharedSwarmClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSwarmClient").finish_non_exhaustive()
    }
}

impl<T: SwarmTransport> SharedSwarmClient<T> {
    /// Create a handle with a deferred client builder. The builder runs
    /// at most once per client lifetime (until [`destroy`](Self::destroy)).
    pub fn new<F, Fut>(builder: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SwarmError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                builder: Box::new(move || Box::pin(builder())),
            }),
        }
    }

    /// Return the client, building it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the builder's [`SwarmError`]; a failed build leaves
    /// the slot empty so a later call retries.
    pub async fn get_or_init(&self) -> Result<Arc<T>, SwarmError> {
        let mut slot = self.inner.slot.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        tracing::info!("initializing swarm client");
        let client = Arc::new((self.inner.builder)().await?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// The client, when already initialized.
    pub async fn current(&self) -> Option<Arc<T>> {
        self.inner.slot.lock().await.as_ref().map(Arc::clone)
    }

    /// Process-wide teardown: drop the shared instance.
    ///
    /// Existing `Arc` holders keep the old client alive until they
    /// release it; the next [`get_or_init`](Self::get_or_init) builds a
    /// fresh one. Individual transfer consumers must never call this —
    /// they release their own transfers and leave the client running.
    pub async fn destroy(&self) {
        if self.inner.slot.lock().await.take().is_some() {
            tracing::info!("swarm client destroyed");
        }
    }
}
