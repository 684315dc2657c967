//! # Fleetsync Testkit
//!
//! Testing utilities for fleetsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: result-set builders shaped like peer admin tables
//! - **Scripted peers**: [`ScriptedPeer`] serves payloads and advertises
//!   matching checksums, so pulls from it pass re-validation
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use fleetsync_core::{Domain, PeerAddress};
//! use fleetsync_sync::MemoryNetwork;
//! use fleetsync_testkit::{sample_payload, ScriptedPeer};
//!
//! let network = MemoryNetwork::new();
//! let peer = ScriptedPeer::new(&network, PeerAddress::new("10.0.0.2", 6032));
//! let advertised = peer.serve(&sample_payload(Domain::MysqlUsers, 1));
//! assert_eq!(advertised.version, 1);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use fleetsync_testkit::generators::{checksum_history, server_list};
//!
//! proptest! {
//!     #[test]
//!     fn reconcile_is_idempotent(rows in server_list(16)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    checksum_rows, global_checksum_row, metrics_rows, sample_payload, server_list, servers,
    ScriptedPeer,
};
