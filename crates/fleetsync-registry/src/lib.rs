//! # Fleetsync Registry
//!
//! Tracks every peer in the fleet and decides which one, if any, each
//! configuration domain should be pulled from.
//!
//! ## Key Types
//!
//! - [`NodeRegistry`] - Identity → peer state, behind a single mutex
//! - [`LocalChecksums`] - This instance's own per-domain checksums
//! - [`SyncDecision`] - Result of a sync-source query
//!
//! ## Design Notes
//!
//! - **Mark and sweep**: reconciliation marks every entry inactive, revives
//!   the ones still listed and drops the rest, all under one lock
//! - **Hysteresis**: a peer must advertise the same differing checksum for
//!   `diffs_before_sync` polls before it is trusted as a source
//! - **No I/O under the lock**: callers fetch first, then report results

pub mod error;
pub mod local;
pub mod registry;
pub mod selection;
mod stats;

pub use error::{RegistryError, Result};
pub use local::LocalChecksums;
pub use registry::{NodeRegistry, PeerSnapshot, ReconcileReport, DEFAULT_DIFFS_BEFORE_SYNC};
pub use selection::{select, SyncCandidate, SyncDecision};
