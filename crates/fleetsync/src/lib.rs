//! # Fleetsync
//!
//! Checksum-driven configuration convergence for a fleet of proxy
//! instances, without a central coordinator.
//!
//! ## Overview
//!
//! Every instance tracks the per-domain checksums its peers advertise.
//! When a peer has advertised a different checksum for long enough, the
//! instance pulls that domain from the freshest such peer, re-validates
//! that nothing moved during the read, and applies it as a whole.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fleetsync::{Cluster, ClusterConfig};
//! use fleetsync::store::SqliteConfigStore;
//! use fleetsync::sync::MemoryNetwork;
//!
//! async fn example() -> fleetsync::Result<()> {
//!     let store = SqliteConfigStore::open("fleet.db")?;
//!     let config = ClusterConfig::load("cluster.json")?;
//!     let cluster = Cluster::new(MemoryNetwork::default(), store, config)?;
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     cluster.run(shutdown).await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `fleetsync::core` - Data model (checksums, peers, result sets)
//! - `fleetsync::registry` - Peer registry and sync-source selection
//! - `fleetsync::store` - Configuration store trait and backends
//! - `fleetsync::sync` - Peer polling and pulls

pub mod cluster;
pub mod error;

pub use fleetsync_core as core;
pub use fleetsync_registry as registry;
pub use fleetsync_store as store;
pub use fleetsync_sync as sync;

pub use cluster::{Cluster, TickReport};
pub use error::{ClusterError, Result};

pub use fleetsync_core::{Checksum, ChecksumValue, Domain, NodeId, PeerAddress, ResultSet, Row};
pub use fleetsync_registry::{NodeRegistry, SyncCandidate, SyncDecision};
pub use fleetsync_store::{ConfigStore, DomainPayload};
pub use fleetsync_sync::{ClusterConfig, PullOutcome};
