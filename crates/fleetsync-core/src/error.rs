//! Error types for the fleetsync core.

use thiserror::Error;

/// Errors raised while reading a tabular result row.
///
/// A row error rejects the value being parsed and nothing else: callers
/// never write a partially parsed record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("column {0} is NULL")]
    NullValue(String),

    #[error("invalid value for column {column}: {value:?}")]
    InvalidValue { column: String, value: String },

    #[error("short row: expected {expected} columns, got {got}")]
    ShortRow { expected: usize, got: usize },

    #[error("unknown domain: {0}")]
    UnknownDomain(String),
}

/// Core errors outside of row parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("row error: {0}")]
    Row(#[from] RowError),
}
