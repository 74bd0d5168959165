#![forbid(unsafe_code)]
//! Append-only multi-version key/value store.
//!
//! Each key holds an ordered history of versions; a single global sequence
//! counter totally orders every mutation in the store, across all keys.
//! Records are never mutated or removed; deletion appends a tombstone.
//! The store is an owned object passed explicitly between operations; it is
//! single-writer and holds no locks.

use ikv_types::{Key, SeqNo, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One version of a key: a sequence-stamped payload or a tombstone.
///
/// A tombstone is a record with no payload; it marks the key logically
/// deleted at `seq` without removing prior history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub seq: SeqNo,
    pub payload: Option<Value>,
}

impl VersionRecord {
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.payload.is_some()
    }
}

/// Append-only per-key version histories sharing one sequence counter.
///
/// Invariants:
/// - sequence numbers are strictly increasing across the whole store,
///   never reused;
/// - histories only grow, and only at the tail;
/// - the latest version of a key is its last-appended record (append order
///   and sequence order coincide);
/// - a key with no history is absent, distinct from a key whose latest
///   record is a tombstone.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    next_seq: u64,
    histories: BTreeMap<Key, Vec<VersionRecord>>,
}

impl VersionedStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            histories: BTreeMap::new(),
        }
    }

    fn alloc_seq(&mut self) -> SeqNo {
        let seq = SeqNo(self.next_seq);
        self.next_seq = self.next_seq.saturating_add(1);
        seq
    }

    /// Append a live version of `key` under a freshly allocated sequence
    /// number. Always succeeds; creates the history on first write.
    pub fn append(&mut self, key: Key, payload: Value) -> SeqNo {
        let seq = self.alloc_seq();
        self.histories.entry(key).or_default().push(VersionRecord {
            seq,
            payload: Some(payload),
        });
        seq
    }

    /// Append a tombstone for `key` under a freshly allocated sequence
    /// number. Works for keys with or without prior history.
    pub fn tombstone(&mut self, key: Key) -> SeqNo {
        let seq = self.alloc_seq();
        self.histories
            .entry(key)
            .or_default()
            .push(VersionRecord { seq, payload: None });
        seq
    }

    /// The latest version of `key`; `None` when the key has no history.
    #[must_use]
    pub fn latest(&self, key: &Key) -> Option<&VersionRecord> {
        self.histories.get(key).and_then(|records| records.last())
    }

    /// Full append-order history of `key` (empty for absent keys).
    #[must_use]
    pub fn history(&self, key: &Key) -> &[VersionRecord] {
        self.histories.get(key).map_or(&[], Vec::as_slice)
    }

    /// Iterate every written key with its history.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &[VersionRecord])> {
        self.histories
            .iter()
            .map(|(key, records)| (key, records.as_slice()))
    }

    /// Number of keys with any history at all.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.histories.len()
    }

    /// Highest sequence number allocated so far (0 before the first write).
    #[must_use]
    pub fn high_seq(&self) -> SeqNo {
        SeqNo(self.next_seq.saturating_sub(1))
    }

    /// Diagnostic dump of every key's full history, one line per record.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (key, records) in &self.histories {
            let _ = writeln!(out, "{key}:");
            for record in records {
                match &record.payload {
                    Some(value) => {
                        let _ = writeln!(out, "  seq={} value={value}", record.seq);
                    }
                    None => {
                        let _ = writeln!(out, "  seq={} tombstone", record.seq);
                    }
                }
            }
        }
        out
    }
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ikv_types::{IndexId, PrimaryKey, RowTuple};

    fn tuple_value(raw: &str) -> Value {
        Value::Tuple(RowTuple::parse(raw))
    }

    #[test]
    fn sequence_numbers_are_global_across_keys() {
        let mut store = VersionedStore::new();
        let s1 = store.append(Key::row("1"), tuple_value("1,A,a"));
        let s2 = store.append(Key::index(IndexId(1), "A"), Value::Pk(PrimaryKey::new("1")));
        let s3 = store.tombstone(Key::row("2"));

        assert_eq!(s1, SeqNo(1));
        assert_eq!(s2, SeqNo(2));
        assert_eq!(s3, SeqNo(3));
        assert_eq!(store.high_seq(), SeqNo(3));
    }

    #[test]
    fn history_is_append_only_and_ordered() {
        let mut store = VersionedStore::new();
        let key = Key::row("1");
        store.append(key.clone(), tuple_value("1,A,a"));
        store.append(key.clone(), tuple_value("1,A,b"));
        store.tombstone(key.clone());

        let history = store.history(&key);
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(history[0].payload, Some(tuple_value("1,A,a")));
        assert_eq!(history[1].payload, Some(tuple_value("1,A,b")));
        assert!(history[2].is_tombstone());
    }

    #[test]
    fn latest_is_the_tail_record() {
        let mut store = VersionedStore::new();
        let key = Key::row("1");
        store.append(key.clone(), tuple_value("1,A,a"));
        store.append(key.clone(), tuple_value("1,B,b"));

        let latest = store.latest(&key).expect("latest");
        assert_eq!(latest.payload, Some(tuple_value("1,B,b")));
        assert_eq!(latest.seq, SeqNo(2));
    }

    #[test]
    fn absent_is_distinct_from_tombstoned() {
        let mut store = VersionedStore::new();
        let absent = Key::row("never");
        let deleted = Key::row("gone");
        store.tombstone(deleted.clone());

        assert!(store.latest(&absent).is_none());
        assert!(store.history(&absent).is_empty());

        let latest = store.latest(&deleted).expect("tombstone record");
        assert!(latest.is_tombstone());
        assert_eq!(store.history(&deleted).len(), 1);
    }

    #[test]
    fn tombstone_on_fresh_key_creates_history() {
        let mut store = VersionedStore::new();
        let seq = store.tombstone(Key::index(IndexId(2), "x"));
        assert_eq!(seq, SeqNo(1));
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn append_after_tombstone_revives_key() {
        let mut store = VersionedStore::new();
        let key = Key::row("1");
        store.append(key.clone(), tuple_value("1,A,a"));
        store.tombstone(key.clone());
        store.append(key.clone(), tuple_value("1,B,b"));

        let latest = store.latest(&key).expect("latest");
        assert!(latest.is_live());
        assert_eq!(store.history(&key).len(), 3);
    }

    #[test]
    fn iter_visits_every_written_key() {
        let mut store = VersionedStore::new();
        store.append(Key::row("1"), tuple_value("1,A,a"));
        store.append(Key::index(IndexId(1), "A"), Value::Pk(PrimaryKey::new("1")));
        store.tombstone(Key::row("2"));

        assert_eq!(store.iter().count(), 3);
        assert_eq!(store.key_count(), 3);
        assert!(store.iter().all(|(_, history)| !history.is_empty()));
    }

    #[test]
    fn dump_lists_values_and_tombstones() {
        let mut store = VersionedStore::new();
        let key = Key::row("1");
        store.append(key.clone(), tuple_value("1,A,a"));
        store.tombstone(key);

        let dump = store.dump();
        assert!(dump.contains("row:1:"));
        assert!(dump.contains("seq=1 value=1,A,a"));
        assert!(dump.contains("seq=2 tombstone"));
    }
}
