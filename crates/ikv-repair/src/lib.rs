#![forbid(unsafe_code)]
//! Two-phase conflict repair for stale row/index residue.
//!
//! After conflicting writes, a store can hold rows whose index slots were
//! reassigned and index entries whose owning row version was overwritten.
//! [`ConflictRepairer::repair`] restores the row↔index contract by
//! selectively tombstoning exactly the stale versions:
//!
//! 1. **Index-first cleanup.** A superseded index version whose payload
//!    differs from the index key's current payload names a row that lost
//!    that index slot. If that row is still live and still claims the slot,
//!    the row is the stale artifact: tombstone it.
//! 2. **Row cleanup.** Every superseded row version's canonical entries
//!    are residue candidates. An entry is tombstoned unless its target is
//!    already dead, already superseded by a different value, or still owned
//!    by the row's surviving version.
//!
//! One pass of each phase, never retried and never erroring; callers
//! re-run the checker afterwards. A residual violation after repair is a
//! correctness failure of this algorithm, not a retry condition.

use ikv_codec::KeyCodec;
use ikv_store::VersionedStore;
use ikv_types::{Entry, Key, PrimaryKey, RowTuple, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ── Report ──────────────────────────────────────────────────────────────────

/// What one repair pass tombstoned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Rows tombstoned by the index-first phase.
    pub rows_tombstoned: Vec<Key>,
    /// Row/index residue tombstoned by the row phase.
    pub residue_tombstoned: Vec<Key>,
}

impl RepairReport {
    /// True if the pass changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.rows_tombstoned.is_empty() && self.residue_tombstoned.is_empty()
    }

    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.rows_tombstoned.len() + self.residue_tombstoned.len()
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tombstoned {} rows, {} residue entries",
            self.rows_tombstoned.len(),
            self.residue_tombstoned.len(),
        )
    }
}

// ── Repairer ────────────────────────────────────────────────────────────────

/// Restores the row↔index contract by tombstoning stale versions.
pub struct ConflictRepairer<'a> {
    codec: &'a KeyCodec,
}

impl<'a> ConflictRepairer<'a> {
    #[must_use]
    pub fn new(codec: &'a KeyCodec) -> Self {
        Self { codec }
    }

    /// Run the two phases, in order, exactly once each.
    ///
    /// # Panics
    ///
    /// Panics if a superseded version references a key with no history, or
    /// if a stored payload's shape does not match its key kind. Both are
    /// preconditions guaranteed by populating the store through
    /// `apply_rows`, distinct from the checker's recoverable violations.
    pub fn repair(&self, store: &mut VersionedStore) -> RepairReport {
        let mut report = RepairReport::default();
        self.index_phase(store, &mut report);
        self.row_phase(store, &mut report);
        debug!(
            rows = report.rows_tombstoned.len(),
            residue = report.residue_tombstoned.len(),
            "repair pass complete"
        );
        report
    }

    /// Phase 1: for every index key, each superseded version whose payload
    /// differs from the key's current payload names a candidate row. If the
    /// row is live and its canonical entries still claim that exact index
    /// pair, the row lost the slot and is tombstoned.
    fn index_phase(&self, store: &mut VersionedStore, report: &mut RepairReport) {
        // Candidates are collected first: only row keys get tombstoned in
        // this phase, so the index histories being walked never change.
        let mut candidates: Vec<(Key, PrimaryKey)> = Vec::new();
        for (key, history) in store.iter() {
            if !key.is_index() || history.len() < 2 {
                continue;
            }
            let Some(latest) = history.last() else {
                continue;
            };
            for version in &history[..history.len() - 1] {
                if version.payload == latest.payload {
                    continue;
                }
                let pk = match &version.payload {
                    None => continue,
                    Some(Value::Pk(pk)) => pk.clone(),
                    Some(payload) => {
                        panic!("payload shape does not match key kind: {key}={payload}")
                    }
                };
                candidates.push((key.clone(), pk));
            }
        }

        for (index_key, pk) in candidates {
            let row_key = Key::Row(pk.clone());
            let tuple = match store.latest(&row_key) {
                None => panic!(
                    "superseded index entry {index_key} references {row_key}, which was never written"
                ),
                Some(record) => match &record.payload {
                    None => continue,
                    Some(Value::Tuple(tuple)) => tuple.clone(),
                    Some(payload) => {
                        panic!("payload shape does not match key kind: {row_key}={payload}")
                    }
                },
            };

            let stale = Entry {
                key: index_key.clone(),
                value: Value::Pk(pk),
            };
            if self.stored_entries(&row_key, &tuple).contains(&stale) {
                debug!(%row_key, %index_key, "row still claims a reassigned index slot");
                store.tombstone(row_key.clone());
                report.rows_tombstoned.push(row_key);
            }
        }
    }

    /// Phase 2: every superseded row version's canonical entries are
    /// residue candidates, judged against the surviving version's keep set
    /// at tombstoning time.
    fn row_phase(&self, store: &mut VersionedStore, report: &mut RepairReport) {
        // Same collect-then-mutate split: this phase only tombstones entry
        // targets derived from superseded versions (index keys in practice;
        // a row's own entry always fails the value match below), so the row
        // histories being walked stay stable.
        struct RowWork {
            keep: Vec<Entry>,
            candidates: Vec<Entry>,
        }

        let mut work: Vec<RowWork> = Vec::new();
        for (key, history) in store.iter() {
            if !key.is_row() || history.len() < 2 {
                continue;
            }
            let Some(latest) = history.last() else {
                continue;
            };
            let keep = match &latest.payload {
                None => Vec::new(),
                Some(Value::Tuple(tuple)) => self.stored_entries(key, tuple),
                Some(payload) => {
                    panic!("payload shape does not match key kind: {key}={payload}")
                }
            };

            let mut candidates = Vec::new();
            for version in history {
                if version.payload == latest.payload {
                    continue;
                }
                let tuple = match &version.payload {
                    None => continue,
                    Some(Value::Tuple(tuple)) => tuple,
                    Some(payload) => {
                        panic!("payload shape does not match key kind: {key}={payload}")
                    }
                };
                candidates.extend(self.stored_entries(key, tuple));
            }
            if !candidates.is_empty() {
                work.push(RowWork { keep, candidates });
            }
        }

        for RowWork { keep, candidates } in work {
            for entry in candidates {
                let current = match store.latest(&entry.key) {
                    None => panic!(
                        "superseded row version references {}, which was never written",
                        entry.key
                    ),
                    Some(record) => record.payload.clone(),
                };
                // Already dead, already superseded by a different writer, or
                // still owned by the surviving version: leave it alone.
                let Some(current) = current else {
                    continue;
                };
                if current != entry.value || keep.contains(&entry) {
                    continue;
                }
                debug!(key = %entry.key, "tombstoning stale residue");
                store.tombstone(entry.key.clone());
                report.residue_tombstoned.push(entry.key);
            }
        }
    }

    fn stored_entries(&self, key: &Key, tuple: &RowTuple) -> Vec<Entry> {
        match self.codec.encode(tuple) {
            Ok(entries) => entries,
            Err(err) => panic!("stored row {key} no longer decodes under the schema: {err}"),
        }
    }
}
