//! Typed rows parsed out of result sets.
//!
//! Each parser validates one row in full before returning it, so a
//! malformed row is rejected on its own and never half-applied.

use serde::{Deserialize, Serialize};

use crate::checksum::{Checksum, ChecksumValue};
use crate::domain::Domain;
use crate::error::RowError;
use crate::resultset::{Record, ResultSet};
use crate::types::PeerAddress;

/// Operational status that excludes a server from the authoritative list.
pub const STATUS_OFFLINE_HARD: &str = "OFFLINE_HARD";

/// One row of the fleet-member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRow {
    pub hostname: String,
    pub port: u16,
    pub weight: u64,
    pub comment: String,
    /// Operational status, when the source provides one.
    pub status: Option<String>,
}

impl ServerRow {
    pub fn new(hostname: impl Into<String>, port: u16, weight: u64, comment: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            weight,
            comment: comment.into(),
            status: None,
        }
    }

    /// Parse `(hostname, port, weight, comment[, status])`.
    pub fn from_record(record: &Record<'_>) -> Result<Self, RowError> {
        let hostname = record.str("hostname", 0)?.trim().to_string();
        if hostname.is_empty() {
            return Err(RowError::InvalidValue {
                column: "hostname".into(),
                value: hostname,
            });
        }
        let port = record.parse::<u16>("port", 1)?;
        if port == 0 {
            return Err(RowError::InvalidValue {
                column: "port".into(),
                value: "0".into(),
            });
        }
        let weight = match record.opt_str("weight", 2) {
            Ok(Some(raw)) => raw.trim().parse::<u64>().map_err(|_| RowError::InvalidValue {
                column: "weight".into(),
                value: raw.to_string(),
            })?,
            Ok(None) | Err(RowError::MissingColumn(_)) | Err(RowError::ShortRow { .. }) => 0,
            Err(e) => return Err(e),
        };
        let comment = record
            .opt_str("comment", 3)
            .ok()
            .flatten()
            .unwrap_or_default()
            .to_string();
        let status = record
            .opt_str("status", 4)
            .ok()
            .flatten()
            .map(str::to_string);

        Ok(Self {
            hostname,
            port,
            weight,
            comment,
            status,
        })
    }

    pub fn address(&self) -> PeerAddress {
        PeerAddress::new(self.hostname.clone(), self.port)
    }

    pub fn is_offline_hard(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(STATUS_OFFLINE_HARD))
    }
}

/// Parse every row, keeping per-row outcomes.
pub fn parse_server_rows(set: &ResultSet) -> Vec<Result<ServerRow, RowError>> {
    set.records().map(|r| ServerRow::from_record(&r)).collect()
}

/// One row of a peer's checksum table: `(name, version, epoch, checksum)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRow {
    pub domain: Domain,
    pub value: ChecksumValue,
}

impl ChecksumRow {
    pub fn from_record(record: &Record<'_>) -> Result<Self, RowError> {
        let domain = record.str("name", 0)?.parse::<Domain>()?;
        let version = record.parse::<u64>("version", 1)?;
        let epoch = record.parse::<i64>("epoch", 2)?;
        let raw = record.str("checksum", 3)?;
        let checksum = Checksum::from_hex(raw).map_err(|_| RowError::InvalidValue {
            column: "checksum".into(),
            value: raw.to_string(),
        })?;
        Ok(Self {
            domain,
            value: ChecksumValue::new(checksum, version, epoch),
        })
    }
}

/// Parse every checksum row, keeping per-row outcomes.
pub fn parse_checksum_rows(set: &ResultSet) -> Vec<Result<ChecksumRow, RowError>> {
    set.records().map(|r| ChecksumRow::from_record(&r)).collect()
}

/// Parse a single-value global checksum result.
pub fn parse_global_checksum(set: &ResultSet) -> Result<Checksum, RowError> {
    let record = set
        .records()
        .next()
        .ok_or(RowError::ShortRow { expected: 1, got: 0 })?;
    let raw = record.str("global_checksum", 0)?;
    Checksum::from_hex(raw).map_err(|_| RowError::InvalidValue {
        column: "global_checksum".into(),
        value: raw.to_string(),
    })
}
