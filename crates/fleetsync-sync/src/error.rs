//! Error types for the sync module.

use fleetsync_core::{PeerAddress, RowError};
use thiserror::Error;

/// Errors that can occur during polling and pulls.
///
/// Checksum drift during a pull is not an error; it is reported as
/// [`crate::PullOutcome::Conflict`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Could not open an admin connection to the peer.
    #[error("connect to {peer} failed: {reason}")]
    Connect { peer: PeerAddress, reason: String },

    /// A query against the peer failed.
    #[error("query on {peer} failed: {reason}")]
    Query { peer: PeerAddress, reason: String },

    /// Timeout waiting for the peer.
    #[error("timeout talking to {0}")]
    Timeout(PeerAddress),

    /// The peer returned rows that failed validation.
    #[error("malformed result from {peer}: {source}")]
    Malformed {
        peer: PeerAddress,
        #[source]
        source: RowError,
    },

    /// The peer's membership list has no active node in it.
    #[error("membership list from {0} has no active nodes")]
    EmptyMembership(PeerAddress),

    /// Applying or persisting the pulled configuration failed.
    #[error("store error: {0}")]
    Store(#[from] fleetsync_store::StoreError),

    /// A report was rejected by the registry.
    #[error("registry error: {0}")]
    Registry(#[from] fleetsync_registry::RegistryError),

    /// Invalid cluster configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
