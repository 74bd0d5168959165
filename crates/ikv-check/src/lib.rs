#![forbid(unsafe_code)]
//! Row↔index invariant checking over a store's live state.
//!
//! For every key whose latest version is live, the checker verifies the
//! derived contract in both directions: a live row's canonical entries must
//! all exist, be live, and hold the expected values; a live index entry
//! must point at a live row whose columns still contain the indexed value.
//! The reverse index check is independent of the forward row check: an
//! index can look valid from the row's side and still be orphaned after the
//! row was overwritten.

use ikv_codec::KeyCodec;
use ikv_store::VersionedStore;
use ikv_types::{Key, PrimaryKey, RowTuple, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

// ── Violation taxonomy ──────────────────────────────────────────────────────

/// A detected break of the row↔index invariant.
///
/// Each variant carries the offending key, its current value, and the
/// expected target for diagnostics. Checking fails fast: the first
/// violation found is returned, nothing is aggregated.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    /// A live entry references a key with no history at all.
    #[error("{key}={value} references {target}, which does not exist")]
    DanglingTarget { key: Key, value: Value, target: Key },
    /// A live entry references a key whose latest version is a tombstone.
    #[error("{key}={value} references {target}, which is deleted")]
    TombstonedTarget { key: Key, value: Value, target: Key },
    /// A referenced key is live but holds a different value than the
    /// source entry expects.
    #[error("{key}={value} expects {target}={want}, got {got}")]
    ValueMismatch {
        key: Key,
        value: Value,
        target: Key,
        want: Value,
        got: Value,
    },
    /// A live index entry points at a live row whose columns no longer
    /// contain the indexed value.
    #[error("{key}={value} indexed value {indexed:?} is not among the columns of {row}")]
    OrphanIndexValue {
        key: Key,
        value: Value,
        indexed: String,
        row: RowTuple,
    },
    /// The store has no live keys at all.
    #[error("store has no live entries")]
    EmptyStore,
}

// ── Checker ─────────────────────────────────────────────────────────────────

/// Validates the row↔index contract over a store's current live state.
pub struct ConsistencyChecker<'a> {
    codec: &'a KeyCodec,
}

impl<'a> ConsistencyChecker<'a> {
    #[must_use]
    pub fn new(codec: &'a KeyCodec) -> Self {
        Self { codec }
    }

    /// Check every live key; returns the live-key count on success or the
    /// first violation found. Any iteration order must pass, so no caller
    /// may depend on which violation surfaces first.
    ///
    /// # Panics
    ///
    /// Panics if a live record's payload shape does not match its key kind
    /// or no longer decodes under the schema. Both are preconditions
    /// guaranteed by populating the store through `apply_rows`, not
    /// recoverable violations.
    pub fn check(&self, store: &VersionedStore) -> Result<u64, Violation> {
        let mut live_keys = 0_u64;

        for (key, history) in store.iter() {
            let Some(latest) = history.last() else {
                continue;
            };
            let Some(payload) = &latest.payload else {
                continue;
            };
            live_keys += 1;
            trace!(%key, seq = latest.seq.0, "checking live key");

            match (key, payload) {
                (Key::Row(_), Value::Tuple(tuple)) => {
                    self.check_row(store, key, tuple)?;
                }
                (Key::Index { value: indexed, .. }, Value::Pk(pk)) => {
                    Self::check_index(store, key, indexed, pk)?;
                }
                (key, payload) => {
                    panic!("payload shape does not match key kind: {key}={payload}")
                }
            }
        }

        if live_keys == 0 {
            return Err(Violation::EmptyStore);
        }
        Ok(live_keys)
    }

    /// Forward check: every canonical entry of a live row must exist, be
    /// live, and hold the expected value.
    fn check_row(
        &self,
        store: &VersionedStore,
        key: &Key,
        tuple: &RowTuple,
    ) -> Result<(), Violation> {
        let entries = match self.codec.encode(tuple) {
            Ok(entries) => entries,
            Err(err) => panic!("stored row {key} no longer decodes under the schema: {err}"),
        };

        for entry in entries {
            let Some(target) = store.latest(&entry.key) else {
                return Err(Violation::DanglingTarget {
                    key: key.clone(),
                    value: Value::Tuple(tuple.clone()),
                    target: entry.key,
                });
            };
            match &target.payload {
                None => {
                    return Err(Violation::TombstonedTarget {
                        key: key.clone(),
                        value: Value::Tuple(tuple.clone()),
                        target: entry.key,
                    });
                }
                Some(got) if *got != entry.value => {
                    return Err(Violation::ValueMismatch {
                        key: key.clone(),
                        value: Value::Tuple(tuple.clone()),
                        target: entry.key,
                        want: entry.value,
                        got: got.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Reverse check: a live index entry must point at a live row whose
    /// columns contain the indexed value.
    fn check_index(
        store: &VersionedStore,
        key: &Key,
        indexed: &str,
        pk: &PrimaryKey,
    ) -> Result<(), Violation> {
        let target = Key::Row(pk.clone());
        let Some(row) = store.latest(&target) else {
            return Err(Violation::DanglingTarget {
                key: key.clone(),
                value: Value::Pk(pk.clone()),
                target,
            });
        };
        let row_tuple = match &row.payload {
            None => {
                return Err(Violation::TombstonedTarget {
                    key: key.clone(),
                    value: Value::Pk(pk.clone()),
                    target,
                });
            }
            Some(Value::Tuple(tuple)) => tuple,
            Some(payload) => {
                panic!("payload shape does not match key kind: {target}={payload}")
            }
        };

        if !row_tuple.contains(indexed) {
            return Err(Violation::OrphanIndexValue {
                key: key.clone(),
                value: Value::Pk(pk.clone()),
                indexed: indexed.to_owned(),
                row: row_tuple.clone(),
            });
        }
        Ok(())
    }
}
