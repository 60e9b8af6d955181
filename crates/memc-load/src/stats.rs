//! 📊 Counting things, and passing judgment on the count.
//!
//! 🧠 Knowledge graph:
//! - `LoadCounters`: plain `{processed, errors}`. Each worker keeps its own, locally, no atomics.
//! - `RunStats`: the atomic accumulator a worker folds its counters into when it finishes.
//!   One per file. The file-level verdict comes from here, not from any single worker.
//! - Error rate = errors / processed. Nothing processed at all = rate 1.0 = failed load.
//!   An empty file is not a success. It is a very quiet failure.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, info};

/// 🔢 processed + errors. That's it. That's the struct.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadCounters {
    pub processed: u64,
    pub errors: u64,
}

impl LoadCounters {
    /// 📈 errors / processed, with `x / 0` defined as total failure.
    pub fn error_rate(&self) -> f64 {
        if self.processed == 0 {
            1.0
        } else {
            self.errors as f64 / self.processed as f64
        }
    }

    /// ✅ strictly below the bar passes. Equal to the bar does not.
    pub fn is_acceptable(&self, normal_error_rate: f64) -> bool {
        self.error_rate() < normal_error_rate
    }

    pub(crate) fn merge(&mut self, other: LoadCounters) {
        self.processed += other.processed;
        self.errors += other.errors;
    }

    /// 📣 Log the verdict for `scope` (a worker, a file, or the whole run).
    pub(crate) fn log_verdict(&self, scope: &str, normal_error_rate: f64) {
        let error_rate = self.error_rate();
        if self.is_acceptable(normal_error_rate) {
            info!(
                processed = self.processed,
                errors = self.errors,
                "✅ {}: Acceptable error rate ({:.4}). Successful load",
                scope,
                error_rate
            );
        } else {
            error!(
                processed = self.processed,
                errors = self.errors,
                "💀 {}: High error rate ({:.4} >= {}). Failed load",
                scope,
                error_rate,
                normal_error_rate
            );
        }
    }
}

/// 🧮 The shared tally for one file. Workers `absorb` into it on their way out.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    processed: AtomicU64,
    errors: AtomicU64,
}

impl RunStats {
    pub(crate) fn absorb(&self, counters: LoadCounters) {
        self.processed.fetch_add(counters.processed, Ordering::Relaxed);
        self.errors.fetch_add(counters.errors, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LoadCounters {
        LoadCounters {
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_nothing_processed_means_total_failure() {
        let counters = LoadCounters { processed: 0, errors: 0 };
        assert_eq!(counters.error_rate(), 1.0);
        assert!(!counters.is_acceptable(0.01));
    }

    #[test]
    fn the_one_where_one_in_a_hundred_is_one_too_many() {
        let counters = LoadCounters { processed: 99, errors: 1 };
        assert!((counters.error_rate() - 0.010101).abs() < 1e-6);
        assert!(!counters.is_acceptable(0.01));
    }

    #[test]
    fn the_one_where_a_clean_run_passes() {
        let counters = LoadCounters { processed: 100, errors: 0 };
        assert_eq!(counters.error_rate(), 0.0);
        assert!(counters.is_acceptable(0.01));
    }

    #[test]
    fn the_one_where_workers_fold_into_one_tally() {
        let stats = RunStats::default();
        stats.absorb(LoadCounters { processed: 10, errors: 1 });
        stats.absorb(LoadCounters { processed: 5, errors: 0 });
        stats.absorb(LoadCounters::default());
        assert_eq!(stats.snapshot(), LoadCounters { processed: 15, errors: 1 });
    }

    #[test]
    fn the_one_where_merge_adds_both_columns() {
        let mut total = LoadCounters { processed: 1, errors: 2 };
        total.merge(LoadCounters { processed: 3, errors: 4 });
        assert_eq!(total, LoadCounters { processed: 4, errors: 6 });
    }
}
