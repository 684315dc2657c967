//! ConfigStore trait: where pulled configuration is applied.
//!
//! Each domain exists in two layers: `runtime` (what is live) and `disk`
//! (what survives a restart). Implementations include SQLite (primary) and
//! in-memory (for tests).

use async_trait::async_trait;
use fleetsync_core::{Checksum, Domain};

use crate::error::Result;
use crate::payload::DomainPayload;

/// Storage layer of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Runtime,
    Disk,
}

impl Layer {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Layer::Runtime => "runtime",
            Layer::Disk => "disk",
        }
    }
}

/// Async interface to the local configuration.
///
/// # Design Notes
///
/// - **Atomic replacement**: `apply_runtime` either replaces the whole
///   domain or leaves it exactly as it was. There is no partial apply.
/// - **Explicit persistence**: `save_to_disk` copies the runtime layer of a
///   domain to the disk layer in one step.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Replace the runtime content of `payload.domain`.
    ///
    /// Returns the checksum of the applied content.
    async fn apply_runtime(&self, payload: &DomainPayload) -> Result<Checksum>;

    /// Copy the runtime layer of `domain` to disk.
    async fn save_to_disk(&self, domain: Domain) -> Result<()>;

    /// Current runtime content, `None` if never applied.
    async fn runtime(&self, domain: Domain) -> Result<Option<DomainPayload>>;

    /// Persisted content, `None` if never saved.
    async fn disk(&self, domain: Domain) -> Result<Option<DomainPayload>>;
}
