//! Runtime counters reported by a peer.

use serde::{Deserialize, Serialize};

use crate::error::RowError;
use crate::resultset::ResultSet;

/// Status variable names requested from each peer.
pub mod variables {
    pub const UPTIME: &str = "ProxySQL_Uptime";
    pub const QUESTIONS: &str = "Questions";
    pub const CLIENT_CONNECTIONS_CREATED: &str = "Client_Connections_created";
    pub const CLIENT_CONNECTIONS_CONNECTED: &str = "Client_Connections_connected";
    pub const SERVERS_TABLE_VERSION: &str = "Servers_table_version";

    pub const ALL: [&str; 5] = [
        CLIENT_CONNECTIONS_CONNECTED,
        CLIENT_CONNECTIONS_CREATED,
        UPTIME,
        QUESTIONS,
        SERVERS_TABLE_VERSION,
    ];
}

/// Immutable snapshot of one peer's counters.
///
/// A new poll produces a new snapshot; snapshots are never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// When the snapshot was read (Unix µs).
    pub read_time_us: u64,
    /// Round-trip time of the status query (µs).
    pub response_time_us: u64,
    /// Peer uptime (seconds).
    pub uptime: u64,
    pub questions: u64,
    pub client_connections_created: u64,
    pub client_connections_connected: u64,
    pub servers_table_version: u64,
}

impl NodeMetrics {
    /// Parse a `(Variable_Name, Variable_Value)` result set.
    ///
    /// Every counter in [`variables::ALL`] must be present and numeric;
    /// otherwise the whole snapshot is rejected.
    pub fn from_status(
        set: &ResultSet,
        read_time_us: u64,
        response_time_us: u64,
    ) -> Result<Self, RowError> {
        let mut found: [Option<u64>; 5] = [None; 5];

        for record in set.records() {
            let name = record.str("Variable_Name", 0)?;
            let Some(slot) = variables::ALL
                .iter()
                .position(|v| v.eq_ignore_ascii_case(name))
            else {
                continue;
            };
            found[slot] = Some(record.parse::<u64>("Variable_Value", 1).map_err(|_| {
                RowError::InvalidValue {
                    column: name.to_string(),
                    value: record
                        .opt_str("Variable_Value", 1)
                        .ok()
                        .flatten()
                        .unwrap_or_default()
                        .to_string(),
                }
            })?);
        }

        let get = |slot: usize| {
            found[slot].ok_or_else(|| RowError::MissingColumn(variables::ALL[slot].to_string()))
        };

        Ok(Self {
            read_time_us,
            response_time_us,
            client_connections_connected: get(0)?,
            client_connections_created: get(1)?,
            uptime: get(2)?,
            questions: get(3)?,
            servers_table_version: get(4)?,
        })
    }
}
