//! SQLite implementation of the ConfigStore trait.
//!
//! Tables are stored as CBOR blobs, one row per table, keyed by
//! `(layer, domain, position)`. Every write to a domain runs in a single
//! transaction, so readers see either the old or the new content.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use fleetsync_core::{Checksum, Domain, ResultSet};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::payload::{DomainPayload, NamedTable};
use crate::traits::{ConfigStore, Layer};

/// SQLite-based config store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteConfigStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConfigStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection in a blocking task.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn encode_table(result: &ResultSet) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(result, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_table(body: &[u8]) -> Result<ResultSet> {
    ciborium::from_reader(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn read_layer(conn: &Connection, layer: Layer, domain: Domain) -> Result<Option<DomainPayload>> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT checksum FROM config_domains WHERE layer = ?1 AND domain = ?2",
            params![layer.as_str(), domain.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = exists else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT name, body FROM config_tables
         WHERE layer = ?1 AND domain = ?2
         ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![layer.as_str(), domain.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut payload = DomainPayload::new(domain);
    for (name, body) in rows {
        payload.tables.push(NamedTable {
            name,
            result: decode_table(&body)?,
        });
    }

    if payload.checksum().to_hex() != stored {
        return Err(StoreError::InvalidData(format!(
            "{} {} checksum mismatch: stored {}, computed {}",
            layer.as_str(),
            domain,
            stored,
            payload.checksum()
        )));
    }
    Ok(Some(payload))
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn apply_runtime(&self, payload: &DomainPayload) -> Result<Checksum> {
        let checksum = payload.checksum();
        let domain = payload.domain;
        let encoded = payload
            .tables
            .iter()
            .map(|t| Ok((t.name.clone(), encode_table(&t.result)?)))
            .collect::<Result<Vec<_>>>()?;

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let layer = Layer::Runtime.as_str();
            tx.execute(
                "DELETE FROM config_tables WHERE layer = ?1 AND domain = ?2",
                params![layer, domain.as_str()],
            )?;
            for (position, (name, body)) in encoded.iter().enumerate() {
                tx.execute(
                    "INSERT INTO config_tables (layer, domain, position, name, body)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![layer, domain.as_str(), position as i64, name, body],
                )?;
            }
            tx.execute(
                "INSERT INTO config_domains (layer, domain, checksum, written_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(layer, domain) DO UPDATE SET
                    checksum = excluded.checksum,
                    written_at = excluded.written_at",
                params![layer, domain.as_str(), checksum.to_hex(), fleetsync_core::now_millis()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(domain = %domain, checksum = %checksum, "applied runtime configuration");
        Ok(checksum)
    }

    async fn save_to_disk(&self, domain: Domain) -> Result<()> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let disk = Layer::Disk.as_str();
            let runtime = Layer::Runtime.as_str();
            tx.execute(
                "DELETE FROM config_tables WHERE layer = ?1 AND domain = ?2",
                params![disk, domain.as_str()],
            )?;
            tx.execute(
                "DELETE FROM config_domains WHERE layer = ?1 AND domain = ?2",
                params![disk, domain.as_str()],
            )?;
            tx.execute(
                "INSERT INTO config_tables (layer, domain, position, name, body)
                 SELECT ?1, domain, position, name, body FROM config_tables
                 WHERE layer = ?2 AND domain = ?3",
                params![disk, runtime, domain.as_str()],
            )?;
            tx.execute(
                "INSERT INTO config_domains (layer, domain, checksum, written_at)
                 SELECT ?1, domain, checksum, ?4 FROM config_domains
                 WHERE layer = ?2 AND domain = ?3",
                params![disk, runtime, domain.as_str(), fleetsync_core::now_millis()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn runtime(&self, domain: Domain) -> Result<Option<DomainPayload>> {
        self.blocking(move |conn| read_layer(conn, Layer::Runtime, domain))
            .await
    }

    async fn disk(&self, domain: Domain) -> Result<Option<DomainPayload>> {
        self.blocking(move |conn| read_layer(conn, Layer::Disk, domain))
            .await
    }
}
