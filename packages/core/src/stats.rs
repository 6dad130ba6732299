//! Outcome counters for a dispatcher.
//!
//! Each counter is synchronized on its own, so increments from different job tasks
//! never contend on a shared lock. A [`StatsSnapshot`] reads the counters one after
//! another and may observe a state between two increments.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Increment the counter and return the new value.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Live job outcome counters.
#[derive(Debug, Default)]
pub struct Stats {
    rejected: Counter,
    accepted: Counter,
    cancelled: Counter,
    completed: Counter,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rejected(&self) -> u64 {
        self.rejected.increment()
    }

    pub fn record_accepted(&self) -> u64 {
        self.accepted.increment()
    }

    pub fn record_cancelled(&self) -> u64 {
        self.cancelled.increment()
    }

    pub fn record_completed(&self) -> u64 {
        self.completed.increment()
    }

    /// Read all four counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rejected: self.rejected.get(),
            accepted: self.accepted.get(),
            cancelled: self.cancelled.get(),
            completed: self.completed.get(),
        }
    }

    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    pub rejected: u64,
    pub accepted: u64,
    pub cancelled: u64,
    pub completed: u64,
}

impl StatsSnapshot {
    /// Sum of all four counters.
    pub fn total(&self) -> u64 {
        self.rejected + self.accepted + self.cancelled + self.completed
    }

    /// Jobs that received a verdict at admission.
    pub fn submitted(&self) -> u64 {
        self.rejected + self.accepted
    }

    /// Admitted jobs that have run or been cancelled.
    pub fn settled(&self) -> u64 {
        self.cancelled + self.completed
    }

    /// Admitted jobs still queued or running.
    pub fn outstanding(&self) -> u64 {
        self.accepted.saturating_sub(self.settled())
    }

    /// One-line summary for diagnostics.
    pub fn summary(&self) -> String {
        format!(
            "rejected={} accepted={} cancelled={} completed={} total={}",
            self.rejected,
            self.accepted,
            self.cancelled,
            self.completed,
            self.total()
        )
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_are_independent() {
        let stats = Stats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_completed();
        stats.record_rejected();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.cancelled, 0);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.total(), 4);
        assert_eq!(snapshot.submitted(), 3);
        assert_eq!(snapshot.outstanding(), 1);
    }

    #[test]
    fn summary_lists_every_counter() {
        let snapshot = StatsSnapshot {
            rejected: 1,
            accepted: 5,
            cancelled: 2,
            completed: 3,
        };
        assert_eq!(
            snapshot.summary(),
            "rejected=1 accepted=5 cancelled=2 completed=3 total=11"
        );
        assert_eq!(snapshot.to_string(), snapshot.summary());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Stats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_completed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().completed, 8000);
    }
}
