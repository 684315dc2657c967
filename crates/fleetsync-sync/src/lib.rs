//! # Fleetsync Sync
//!
//! Talks to peers: polls their status into the registry and pulls
//! configuration domains from the selected sync source.
//!
//! ## Key Types
//!
//! - [`ClusterCoordinator`] - Runs pulls and re-validates them before applying
//! - [`PeerMonitor`] - Polls checksums and metrics from every peer
//! - [`PeerConnector`] / [`PeerConnection`] - The admin query surface of a peer
//! - [`ClusterConfig`] - Intervals, thresholds and credentials
//!
//! ## Pull Flow
//!
//! ```text
//! Local                               Source peer
//!   |  peer_to_sync(domain)              |
//!   |  lock(domain)                      |
//!   |-------- connect ------------------>|
//!   |-------- SELECT ... (per table) --->|
//!   |<------- rows ----------------------|
//!   |  re-validate checksum              |
//!   |  apply_runtime / save_to_disk      |
//!   |  record_load + resync_local        |
//! ```
//!
//! ## Design Notes
//!
//! - **Optimistic pulls**: rows are read without locking the source; a
//!   checksum that moved during the read discards the pull as a conflict
//! - **Whole-domain apply**: a pull either replaces a domain or leaves it
//!   untouched
//! - **Bounded I/O**: every connect and query runs under `query_timeout_ms`

pub mod config;
pub mod coordinator;
pub mod error;
pub mod monitor;
pub mod peer;
pub mod queries;
pub mod telemetry;

pub use config::{ClusterConfig, ConfigCell, DomainSettings};
pub use coordinator::{ClusterCoordinator, PullOutcome, VariableType};
pub use error::{Result, SyncError};
pub use monitor::{PeerMonitor, PollReport};
pub use peer::{
    memory::MemoryConnection, memory::MemoryNetwork, memory::MemoryPeer, Credentials,
    PeerConnection, PeerConnector,
};
pub use queries::{DomainPlan, FetchQuery, QueryKind};
pub use telemetry::{CounterKey, CounterSet, MetricsRecorder, NoopRecorder, Outcome};
