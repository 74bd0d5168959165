#![forbid(unsafe_code)]
//! Canonical row → entry derivation.
//!
//! [`KeyCodec::encode`] maps a stored row tuple to the full set of entries
//! the store must hold for it: one row entry self-keyed by the primary
//! column, plus one index entry per secondary index mapping the indexed
//! column's value back to the primary key. The mapping is pure and
//! deterministic; it never touches a store.

use ikv_types::{Entry, IndexId, Key, ParseError, PrimaryKey, RowTuple, Value};
use serde::{Deserialize, Serialize};

/// One secondary index: which column it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub id: IndexId,
    pub column: usize,
}

/// Row shape: column count plus the secondary indexes over designated
/// columns. Column 0 is always the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    arity: usize,
    indexes: Vec<IndexSpec>,
}

impl Schema {
    /// Validate and build a schema.
    ///
    /// Every indexed column must be a non-primary column inside the arity,
    /// and index ids must be distinct.
    pub fn new(arity: usize, indexes: Vec<IndexSpec>) -> Result<Self, ParseError> {
        if arity == 0 {
            return Err(ParseError::InvalidField {
                field: "arity",
                reason: "schema needs at least the primary column",
            });
        }
        for spec in &indexes {
            if spec.column == 0 || spec.column >= arity {
                return Err(ParseError::InvalidField {
                    field: "index_column",
                    reason: "indexed column must be a non-primary column within the arity",
                });
            }
        }
        let mut ids: Vec<IndexId> = indexes.iter().map(|spec| spec.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != indexes.len() {
            return Err(ParseError::InvalidField {
                field: "index_id",
                reason: "index ids must be distinct",
            });
        }
        Ok(Self { arity, indexes })
    }

    /// The example schema: three columns, index 1 over column 1 and index 2
    /// over column 2.
    #[must_use]
    pub fn example() -> Self {
        Self {
            arity: 3,
            indexes: vec![
                IndexSpec {
                    id: IndexId(1),
                    column: 1,
                },
                IndexSpec {
                    id: IndexId(2),
                    column: 2,
                },
            ],
        }
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }
}

/// Pure mapping from a row tuple to its canonical entry set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCodec {
    schema: Schema,
}

impl KeyCodec {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Codec over [`Schema::example`].
    #[must_use]
    pub fn example() -> Self {
        Self::new(Schema::example())
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Entries derived per row: the row entry plus one per index.
    #[must_use]
    pub fn entries_per_row(&self) -> usize {
        1 + self.schema.indexes.len()
    }

    /// Derive the canonical entry set for `tuple`.
    ///
    /// Order is fixed: row entry first, then index entries in schema order.
    /// Fails only when the tuple's arity does not match the schema; that is
    /// a caller precondition failure, not a store inconsistency.
    pub fn encode(&self, tuple: &RowTuple) -> Result<Vec<Entry>, ParseError> {
        if tuple.arity() != self.schema.arity {
            return Err(ParseError::WrongArity {
                expected: self.schema.arity,
                actual: tuple.arity(),
            });
        }
        // Arity is validated above; column 0 and every indexed column are
        // in bounds from here on.
        let pk = PrimaryKey::new(tuple.columns()[0].clone());

        let mut entries = Vec::with_capacity(self.entries_per_row());
        entries.push(Entry {
            key: Key::Row(pk.clone()),
            value: Value::Tuple(tuple.clone()),
        });
        for spec in &self.schema.indexes {
            entries.push(Entry {
                key: Key::index(spec.id, tuple.columns()[spec.column].clone()),
                value: Value::Pk(pk.clone()),
            });
        }
        Ok(entries)
    }
}
