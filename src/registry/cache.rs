//! Per-run memoization of manifest lookups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use tokio::sync::OnceCell;

use super::{Manifest, ManifestSource};

type Slot = Arc<OnceCell<Arc<Manifest>>>;

/// Wraps a [`ManifestSource`] so each package name is fetched at most once.
///
/// Concurrent lookups of the same name wait on the same in-flight fetch
/// instead of issuing their own. Entries are never invalidated; a failed
/// fetch leaves the slot empty, but failures abort the run anyway.
pub struct CachedSource<S> {
    inner: S,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<S: ManifestSource> CachedSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of names with a completed fetch.
    pub fn cached_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(name.to_string()).or_default().clone()
    }
}

#[async_trait]
impl<S: ManifestSource> ManifestSource for CachedSource<S> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, name: &str) -> Result<Arc<Manifest>> {
        let slot = self.slot(name);
        let manifest = slot
            .get_or_try_init(|| async {
                debug!("Manifest cache miss for {}", name);
                self.inner.fetch(name).await
            })
            .await?;
        Ok(Arc::clone(manifest))
    }
}
