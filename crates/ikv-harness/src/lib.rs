#![forbid(unsafe_code)]
//! Exhaustive conflict-trial driver.
//!
//! External caller for the consistency core: enumerates every batch of
//! `inserts` rows over small per-column value domains, and for each batch
//! runs apply → check → repair → re-check on an independent store. The
//! core is consumed strictly through its three entry points; everything in
//! this crate (enumeration, scheduling, reporting) stays outside it.

use anyhow::{Context, Result, bail, ensure};
use ikv::{KeyCodec, RowTuple, VersionedStore, apply_rows, check, repair};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use tracing::debug;

/// Row domain and batch shape for one sweep.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    /// Per-column candidate values; one inner vec per schema column.
    pub domains: Vec<Vec<String>>,
    /// Rows per batch.
    pub inserts: u32,
}

impl TrialConfig {
    /// Reference scale: a 3×3×3 row domain swept at six inserts.
    #[must_use]
    pub fn example() -> Self {
        Self {
            domains: vec![
                vec!["1".into(), "2".into(), "3".into()],
                vec!["a".into(), "b".into(), "c".into()],
                vec!["11".into(), "22".into(), "33".into()],
            ],
            inserts: 6,
        }
    }

    /// Number of distinct rows in the domain.
    #[must_use]
    pub fn row_space(&self) -> u64 {
        self.domains
            .iter()
            .map(|domain| domain.len() as u64)
            .product()
    }

    /// Total batches in the sweep (`row_space ^ inserts`), or `None` on
    /// overflow.
    #[must_use]
    pub fn trial_count(&self) -> Option<u64> {
        self.row_space().checked_pow(self.inserts)
    }

    /// Decode one row index into a tuple, most-significant column first.
    #[must_use]
    pub fn row_for_index(&self, mut row: u64) -> RowTuple {
        let mut columns = vec![String::new(); self.domains.len()];
        for (slot, domain) in columns.iter_mut().zip(&self.domains).rev() {
            let size = domain.len() as u64;
            let pick = usize::try_from(row % size).expect("domain index fits");
            *slot = domain[pick].clone();
            row /= size;
        }
        RowTuple::new(columns)
    }

    /// Decode a trial index into its batch of rows.
    #[must_use]
    pub fn rows_for_trial(&self, trial: u64) -> Vec<RowTuple> {
        let row_space = self.row_space();
        let mut cur = trial;
        (0..self.inserts)
            .map(|_| {
                let row = cur % row_space;
                cur /= row_space;
                self.row_for_index(row)
            })
            .collect()
    }
}

/// Outcome of one trial that ended consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialOutcome {
    /// Whether a repair pass was needed.
    pub repaired: bool,
    /// Live keys reported by the final check.
    pub live_keys: u64,
}

/// Run one batch on a fresh store: apply, check, repair on failure, and
/// re-check. A violation that survives repair is a correctness failure of
/// the repair algorithm and fails the trial.
pub fn run_trial(codec: &KeyCodec, rows: &[RowTuple]) -> Result<TrialOutcome> {
    let mut store = VersionedStore::new();
    apply_rows(&mut store, codec, rows).context("applying batch")?;

    if let Ok(live_keys) = check(&store, codec) {
        return Ok(TrialOutcome {
            repaired: false,
            live_keys,
        });
    }

    let report = repair(&mut store, codec);
    debug!(%report, "repaired conflicting batch");

    match check(&store, codec) {
        Ok(live_keys) => Ok(TrialOutcome {
            repaired: true,
            live_keys,
        }),
        Err(violation) => bail!(
            "residual violation after repair: {violation}\nbatch: {rows:?}\n{}",
            store.dump()
        ),
    }
}

/// First failing trial of a sweep, captured for reproduction.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub trial: u64,
    pub rows: Vec<String>,
    pub error: String,
}

/// Aggregated sweep results.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub trials: u64,
    pub clean: u64,
    pub repaired: u64,
    pub failed: u64,
    pub first_failure: Option<SweepFailure>,
}

impl SweepReport {
    #[must_use]
    pub fn is_clean_sweep(&self) -> bool {
        self.failed == 0
    }
}

/// Sweep every trial in the config across `workers` threads.
///
/// Each trial gets its own store; the threads share only the trial cursor,
/// the counters, and the first-failure slot. The sweep stops claiming new
/// trials once a failure is recorded.
pub fn run_sweep(config: &TrialConfig, codec: &KeyCodec, workers: usize) -> Result<SweepReport> {
    ensure!(
        config.domains.len() == codec.schema().arity(),
        "domain count {} does not match schema arity {}",
        config.domains.len(),
        codec.schema().arity()
    );
    ensure!(
        config.domains.iter().all(|domain| !domain.is_empty()),
        "every column domain needs at least one value"
    );
    let trials = config
        .trial_count()
        .context("trial count overflows u64; shrink the domain or insert count")?;
    let workers = workers.max(1);

    let next_trial = AtomicU64::new(0);
    let clean = AtomicU64::new(0);
    let repaired = AtomicU64::new(0);
    let failed = AtomicU64::new(0);
    let stop = AtomicBool::new(false);
    let first_failure: Mutex<Option<SweepFailure>> = Mutex::new(None);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let trial = next_trial.fetch_add(1, Ordering::Relaxed);
                    if trial >= trials {
                        break;
                    }
                    let rows = config.rows_for_trial(trial);
                    match run_trial(codec, &rows) {
                        Ok(outcome) if outcome.repaired => {
                            repaired.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(_) => {
                            clean.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            let mut slot = first_failure.lock();
                            if slot.is_none() {
                                *slot = Some(SweepFailure {
                                    trial,
                                    rows: rows.iter().map(ToString::to_string).collect(),
                                    error: format!("{error:#}"),
                                });
                            }
                            stop.store(true, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    Ok(SweepReport {
        trials,
        clean: clean.load(Ordering::Relaxed),
        repaired: repaired.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        first_failure: first_failure.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(inserts: u32) -> TrialConfig {
        TrialConfig {
            domains: vec![
                vec!["1".into(), "2".into()],
                vec!["A".into(), "B".into()],
                vec!["a".into(), "b".into()],
            ],
            inserts,
        }
    }

    #[test]
    fn row_space_and_trial_count() {
        let config = small_config(3);
        assert_eq!(config.row_space(), 8);
        assert_eq!(config.trial_count(), Some(512));

        let example = TrialConfig::example();
        assert_eq!(example.row_space(), 27);
        assert_eq!(example.trial_count(), Some(387_420_489));
    }

    #[test]
    fn row_decode_is_exhaustive_and_distinct() {
        let config = small_config(1);
        let rows: std::collections::BTreeSet<String> = (0..config.row_space())
            .map(|row| config.row_for_index(row).to_string())
            .collect();
        assert_eq!(rows.len() as u64, config.row_space());
        assert!(rows.contains("1,A,a"));
        assert!(rows.contains("2,B,b"));
    }

    #[test]
    fn row_decode_is_most_significant_column_first() {
        let config = small_config(1);
        assert_eq!(config.row_for_index(0).to_string(), "1,A,a");
        assert_eq!(config.row_for_index(1).to_string(), "1,A,b");
        assert_eq!(config.row_for_index(2).to_string(), "1,B,a");
        assert_eq!(config.row_for_index(4).to_string(), "2,A,a");
        assert_eq!(config.row_for_index(7).to_string(), "2,B,b");
    }

    #[test]
    fn trial_decode_walks_least_significant_row_first() {
        let config = small_config(2);
        let rows = config.rows_for_trial(1);
        assert_eq!(rows[0].to_string(), "1,A,b");
        assert_eq!(rows[1].to_string(), "1,A,a");

        let rows = config.rows_for_trial(8);
        assert_eq!(rows[0].to_string(), "1,A,a");
        assert_eq!(rows[1].to_string(), "1,A,b");
    }

    #[test]
    fn clean_trial_needs_no_repair() {
        let codec = KeyCodec::example();
        let rows = vec![RowTuple::parse("1,A,a"), RowTuple::parse("2,B,b")];
        let outcome = run_trial(&codec, &rows).expect("trial");
        assert!(!outcome.repaired);
        assert_eq!(outcome.live_keys, 6);
    }

    #[test]
    fn conflicting_trial_repairs_and_converges() {
        let codec = KeyCodec::example();
        let rows = vec![RowTuple::parse("1,A,a"), RowTuple::parse("1,A,b")];
        let outcome = run_trial(&codec, &rows).expect("trial");
        assert!(outcome.repaired);
        assert_eq!(outcome.live_keys, 3);
    }

    #[test]
    fn sweep_covers_every_trial_without_failures() {
        let codec = KeyCodec::example();
        let config = small_config(2);
        let report = run_sweep(&config, &codec, 4).expect("sweep");

        assert_eq!(report.trials, 64);
        assert_eq!(report.clean + report.repaired, 64);
        assert_eq!(report.failed, 0);
        assert!(report.is_clean_sweep());
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn sweep_rejects_domain_schema_mismatch() {
        let codec = KeyCodec::example();
        let config = TrialConfig {
            domains: vec![vec!["1".into()]],
            inserts: 1,
        };
        assert!(run_sweep(&config, &codec, 1).is_err());
    }
}
