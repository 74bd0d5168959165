#![forbid(unsafe_code)]
//! Core vocabulary for the indexed multi-version store.
//!
//! Keys are tagged variants constructed and matched structurally, never a
//! prefixed string that downstream code re-parses. Payloads are typed per
//! key kind: a row version carries its full column tuple, an index version
//! carries the primary key it points back at.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Globally ordered mutation sequence number.
///
/// One counter per store instance; every append and tombstone allocates the
/// next value, giving a total order over all mutations regardless of key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeqNo(pub u64);

/// Identifier of one secondary index within a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u8);

/// Primary key of a row: the value of its primary column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(pub String);

impl PrimaryKey {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A row's full column tuple.
///
/// The tuple itself is shape-agnostic; arity is enforced by the schema at
/// the encode boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowTuple(Vec<String>);

impl RowTuple {
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    /// Parse a comma-separated row literal (`"1,A,a"`).
    ///
    /// Splitting never fails; arity problems surface when the tuple meets a
    /// schema.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(raw.split(',').map(str::to_owned).collect())
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn column(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Whether `value` appears in any column.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|col| col == value)
    }
}

/// Storage key: a primary row entry or one secondary-index entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Primary row entry, keyed by the row's primary column value.
    Row(PrimaryKey),
    /// Secondary-index entry mapping an indexed column value back to a
    /// primary key.
    Index { index: IndexId, value: String },
}

impl Key {
    #[must_use]
    pub fn row(pk: impl Into<String>) -> Self {
        Self::Row(PrimaryKey::new(pk))
    }

    #[must_use]
    pub fn index(index: IndexId, value: impl Into<String>) -> Self {
        Self::Index {
            index,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_row(&self) -> bool {
        matches!(self, Self::Row(_))
    }

    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index { .. })
    }
}

/// Live payload of a version record, typed per key kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Payload of a live row version: its full column tuple.
    Tuple(RowTuple),
    /// Payload of a live index version: the referenced primary key.
    Pk(PrimaryKey),
}

/// One canonical `(key, value)` pair derived from a row tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("wrong tuple arity: expected {expected} columns, got {actual}")]
    WrongArity { expected: usize, actual: usize },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RowTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(pk) => write!(f, "row:{pk}"),
            Self::Index { index, value } => write!(f, "idx{index}:{value}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tuple(tuple) => write!(f, "{tuple}"),
            Self::Pk(pk) => write!(f, "{pk}"),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
