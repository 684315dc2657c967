//! In-memory implementation of the ConfigStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use fleetsync_core::{Checksum, Domain};

use crate::error::{Result, StoreError};
use crate::payload::DomainPayload;
use crate::traits::{ConfigStore, Layer};

/// In-memory config store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryConfigStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    layers: HashMap<(Layer, Domain), DomainPayload>,
    /// Domains whose next apply is rejected.
    reject: HashSet<Domain>,
    /// Domains whose next save to disk fails.
    reject_save: HashSet<Domain>,
    applies: usize,
}

impl MemoryConfigStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `apply_runtime` for `domain`.
    pub fn reject_next_apply(&self, domain: Domain) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reject
            .insert(domain);
    }

    /// Fail the next `save_to_disk` for `domain`.
    pub fn reject_next_save(&self, domain: Domain) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reject_save
            .insert(domain);
    }

    /// Number of successful runtime applies.
    pub fn apply_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .applies
    }

    fn layer(&self, layer: Layer, domain: Domain) -> Option<DomainPayload> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .layers
            .get(&(layer, domain))
            .cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn apply_runtime(&self, payload: &DomainPayload) -> Result<Checksum> {
        let checksum = payload.checksum();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.reject.remove(&payload.domain) {
            return Err(StoreError::ApplyRejected {
                domain: payload.domain.to_string(),
                reason: "rejected by test hook".into(),
            });
        }
        inner
            .layers
            .insert((Layer::Runtime, payload.domain), payload.clone());
        inner.applies += 1;
        Ok(checksum)
    }

    async fn save_to_disk(&self, domain: Domain) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.reject_save.remove(&domain) {
            return Err(StoreError::InvalidData(format!("save of {domain} failed by test hook")));
        }
        match inner.layers.get(&(Layer::Runtime, domain)).cloned() {
            Some(payload) => {
                inner.layers.insert((Layer::Disk, domain), payload);
            }
            None => {
                inner.layers.remove(&(Layer::Disk, domain));
            }
        }
        Ok(())
    }

    async fn runtime(&self, domain: Domain) -> Result<Option<DomainPayload>> {
        Ok(self.layer(Layer::Runtime, domain))
    }

    async fn disk(&self, domain: Domain) -> Result<Option<DomainPayload>> {
        Ok(self.layer(Layer::Disk, domain))
    }
}
