//! Concurrency gate bounding the number of running jobs.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore with one permit per worker.
///
/// A permit is moved into the task running a job and released when that task
/// drops it, so the number of permits in use is the number of running jobs.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One occupied worker slot. Released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate with `capacity` slots, capped at the semaphore permit limit.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a free slot without waiting. Returns `None` when every worker is busy
    /// or the gate is closed.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }

    /// Refuse all future acquisitions. Held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_bounded_by_capacity() {
        let gate = ConcurrencyGate::new(2);
        let first = gate.try_acquire();
        let second = gate.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_use(), 2);

        drop(first);
        assert_eq!(gate.in_use(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn oversized_capacity_is_capped() {
        assert_eq!(dispatch_core::MAX_WORKERS, Semaphore::MAX_PERMITS);
        let gate = ConcurrencyGate::new(usize::MAX);
        assert_eq!(gate.capacity(), Semaphore::MAX_PERMITS);
        assert!(gate.try_acquire().is_some());
        assert_eq!(gate.in_use(), 1);
    }

    #[test]
    fn closed_gate_refuses_new_permits() {
        let gate = ConcurrencyGate::new(3);
        let held = gate.try_acquire();
        gate.close();

        assert!(gate.is_closed());
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_use(), 1);
        drop(held);
        assert_eq!(gate.in_use(), 0);
    }
}
