//! Tabular results exchanged with peers and the local admin layer.
//!
//! Values are carried as nullable text, the way an admin SQL interface
//! returns them. Typed access goes through [`Row`] accessors, which never
//! panic on short or malformed rows.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RowError;

/// A single row of nullable text values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row(pub Vec<Option<String>>);

impl Row {
    /// Build a row where every value is non-null.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw value at `idx`, `None` for NULL or out of range.
    pub fn value(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|v| v.as_deref())
    }
}

/// A named-column result set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row (builder style).
    pub fn with_row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Iterate rows with a column-aware accessor.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record { set: self, row })
    }
}

/// A row viewed through its result set's column names.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    set: &'a ResultSet,
    row: &'a Row,
}

impl<'a> Record<'a> {
    pub fn row(&self) -> &'a Row {
        self.row
    }

    /// Resolve a column by name, falling back to `position` when the
    /// result set carries no header.
    fn index(&self, name: &str, position: usize) -> Result<usize, RowError> {
        let idx = if self.set.columns.is_empty() {
            position
        } else {
            self.set
                .column_index(name)
                .ok_or_else(|| RowError::MissingColumn(name.to_string()))?
        };
        if idx >= self.row.len() {
            return Err(RowError::ShortRow {
                expected: idx + 1,
                got: self.row.len(),
            });
        }
        Ok(idx)
    }

    /// Nullable text value.
    pub fn opt_str(&self, name: &str, position: usize) -> Result<Option<&'a str>, RowError> {
        let idx = self.index(name, position)?;
        Ok(self.row.value(idx))
    }

    /// Non-null text value.
    pub fn str(&self, name: &str, position: usize) -> Result<&'a str, RowError> {
        self.opt_str(name, position)?
            .ok_or_else(|| RowError::NullValue(name.to_string()))
    }

    /// Non-null value parsed with `FromStr`.
    pub fn parse<T: FromStr>(&self, name: &str, position: usize) -> Result<T, RowError> {
        let raw = self.str(name, position)?;
        raw.trim().parse::<T>().map_err(|_| RowError::InvalidValue {
            column: name.to_string(),
            value: raw.to_string(),
        })
    }
}
