//! # Fleetsync Store
//!
//! Where pulled configuration lands. The coordinator applies each domain
//! through the [`ConfigStore`] trait and optionally persists it.
//!
//! ## Key Types
//!
//! - [`ConfigStore`] - Async trait for applying and reading domains
//! - [`SqliteConfigStore`] - SQLite-based persistent storage
//! - [`MemoryConfigStore`] - In-memory storage for tests
//! - [`DomainPayload`] - The full content of one domain
//!
//! ## Design Notes
//!
//! - **All-or-nothing apply**: a domain is replaced in one transaction
//! - **Two layers**: `runtime` is live, `disk` survives restarts

pub mod error;
pub mod memory;
pub mod migration;
pub mod payload;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryConfigStore;
pub use payload::{DomainPayload, NamedTable};
pub use sqlite::SqliteConfigStore;
pub use traits::{ConfigStore, Layer};
