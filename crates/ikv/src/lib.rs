#![forbid(unsafe_code)]
//! Public API facade for the indexed multi-version store.
//!
//! Re-exports the member crates and hosts the three entry points external
//! drivers consume: [`apply_rows`], [`check`], and [`repair`]. Each store
//! instance is fully independent; a driver may evaluate many stores
//! concurrently as long as each one stays single-writer.
//!
//! ```
//! use ikv::{KeyCodec, RowTuple, VersionedStore, apply_rows, check, repair};
//!
//! let codec = KeyCodec::example();
//! let mut store = VersionedStore::new();
//! apply_rows(
//!     &mut store,
//!     &codec,
//!     &[RowTuple::parse("1,A,a"), RowTuple::parse("1,A,b")],
//! )
//! .unwrap();
//!
//! assert!(check(&store, &codec).is_err());
//! repair(&mut store, &codec);
//! assert_eq!(check(&store, &codec), Ok(3));
//! ```

pub use ikv_check::{ConsistencyChecker, Violation};
pub use ikv_codec::{IndexSpec, KeyCodec, Schema};
pub use ikv_repair::{ConflictRepairer, RepairReport};
pub use ikv_store::{VersionRecord, VersionedStore};
pub use ikv_types::{Entry, IndexId, Key, ParseError, PrimaryKey, RowTuple, SeqNo, Value};

/// Apply a batch of row writes: encode each tuple and append every derived
/// entry in canonical order (row entry first, then index entries).
///
/// Fails only on a tuple whose arity does not match the codec's schema;
/// that is a fatal caller precondition, not a consistency violation. Rows
/// already applied before the failing tuple remain in the store.
pub fn apply_rows(
    store: &mut VersionedStore,
    codec: &KeyCodec,
    rows: &[RowTuple],
) -> Result<(), ParseError> {
    for row in rows {
        for entry in codec.encode(row)? {
            store.append(entry.key, entry.value);
        }
    }
    Ok(())
}

/// Check the row↔index invariant over the store's live state.
///
/// Returns the live-key count, or the first violation found.
pub fn check(store: &VersionedStore, codec: &KeyCodec) -> Result<u64, Violation> {
    ConsistencyChecker::new(codec).check(store)
}

/// Run one two-phase repair pass. Never errors; callers re-run [`check`]
/// afterwards to confirm convergence.
pub fn repair(store: &mut VersionedStore, codec: &KeyCodec) -> RepairReport {
    ConflictRepairer::new(codec).repair(store)
}
