//! # Fleetsync Core
//!
//! Pure data model for fleet configuration sync: peer identities, domain
//! checksums with change tracking, metrics snapshots, and the tabular
//! results exchanged with peers.
//!
//! This crate contains no I/O and no locks.
//!
//! ## Key Types
//!
//! - [`NodeEntry`] - Everything tracked for one peer
//! - [`ChecksumRecord`] - One peer's checksum for one domain, with hysteresis
//! - [`NodeMetrics`] - Immutable snapshot of a peer's counters
//! - [`ResultSet`] - Nullable-text rows with named columns
//!
//! ## Checksums
//!
//! Domain content is hashed from a deterministic CBOR encoding. See the
//! [`canonical`] module.

pub mod canonical;
pub mod checksum;
pub mod domain;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod resultset;
pub mod rows;
pub mod types;

pub use canonical::{canonical_tables, TableRef};
pub use checksum::{Checksum, ChecksumRecord, ChecksumValue, Observation};
pub use domain::{Domain, PerDomain};
pub use entry::NodeEntry;
pub use error::{CoreError, RowError};
pub use metrics::NodeMetrics;
pub use resultset::{Record, ResultSet, Row};
pub use rows::{ChecksumRow, ServerRow};
pub use types::{NodeId, PeerAddress};

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Current time as Unix microseconds.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
