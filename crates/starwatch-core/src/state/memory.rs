// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// A watermark store that does not persist across restarts. Useful for
// tests and for deployments where re-baselining after a restart is
// acceptable (no historical posts are ever emitted either way, since an
// empty watermark triggers baselining instead of a flood).

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{StateStore, Watermark};

/// In-memory watermark store.
///
/// Cloning yields a handle onto the same underlying state, which lets
/// tests keep a view of what the engine persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Option<Watermark>>>,
}

impl MemoryStateStore {
    /// Create an empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved watermark, if any.
    pub async fn current(&self) -> Option<Watermark> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Watermark, Error> {
        Ok(self
            .inner
            .read()
            .await
            .clone()
            .unwrap_or_else(Watermark::empty))
    }

    async fn save(&self, watermark: &Watermark) -> Result<(), Error> {
        *self.inner.write().await = Some(watermark.clone());
        Ok(())
    }
}
