#![forbid(unsafe_code)]

//! Check + repair throughput over conflicting batches.
//!
//! Builds a fresh store per iteration (repair mutates), applies a batch
//! with primary-key and index-column collisions, and measures the full
//! detect→repair→re-verify cycle.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use ikv_check::ConsistencyChecker;
use ikv_codec::KeyCodec;
use ikv_repair::ConflictRepairer;
use ikv_store::VersionedStore;
use ikv_types::RowTuple;

fn build_store(codec: &KeyCodec, rows: &[RowTuple]) -> VersionedStore {
    let mut store = VersionedStore::new();
    for row in rows {
        for entry in codec.encode(row).expect("encode") {
            store.append(entry.key, entry.value);
        }
    }
    store
}

fn conflicting_batch(inserts: usize) -> Vec<RowTuple> {
    // Cycle a small value domain so primary keys and indexed columns all
    // collide repeatedly.
    let col0 = ["1", "2", "3"];
    let col1 = ["A", "B", "C"];
    let col2 = ["a", "b", "c"];
    (0..inserts)
        .map(|i| {
            RowTuple::new([
                col0[i % col0.len()],
                col1[(i / 2) % col1.len()],
                col2[(i / 3) % col2.len()],
            ])
        })
        .collect()
}

fn bench_check_clean(c: &mut Criterion) {
    let codec = KeyCodec::example();
    let rows: Vec<RowTuple> = ["1,A,a", "2,B,b", "3,C,c"]
        .iter()
        .map(|raw| RowTuple::parse(raw))
        .collect();
    let store = build_store(&codec, &rows);

    c.bench_function("check_clean_3_rows", |b| {
        let checker = ConsistencyChecker::new(&codec);
        b.iter(|| checker.check(&store).expect("clean"));
    });
}

fn bench_repair_conflicts(c: &mut Criterion) {
    let codec = KeyCodec::example();

    for inserts in [6_usize, 12, 24] {
        let rows = conflicting_batch(inserts);
        c.bench_function(&format!("repair_cycle_{inserts}_inserts"), |b| {
            b.iter_batched(
                || build_store(&codec, &rows),
                |mut store| {
                    let checker = ConsistencyChecker::new(&codec);
                    if checker.check(&store).is_err() {
                        ConflictRepairer::new(&codec).repair(&mut store);
                    }
                    checker.check(&store).is_ok()
                },
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(benches, bench_check_clean, bench_repair_conflicts);
criterion_main!(benches);
