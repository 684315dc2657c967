//! Error types for the registry.

use fleetsync_core::{PeerAddress, RowError};
use thiserror::Error;

/// Errors returned by registry update paths.
///
/// None of these are fatal: callers log and drop the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A report arrived for a peer that is not in the registry.
    #[error("unknown peer: {address}")]
    UnknownPeer { address: PeerAddress },

    /// The reported result set failed validation; nothing was written.
    #[error("malformed report from {address}: {source}")]
    Malformed {
        address: PeerAddress,
        #[source]
        source: RowError,
    },
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
