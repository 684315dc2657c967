//! Error types for the cluster facade.

use fleetsync_core::CoreError;
use fleetsync_registry::RegistryError;
use fleetsync_store::StoreError;
use fleetsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Core data model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Polling or pull error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
