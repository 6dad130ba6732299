//! State shared between the dispatcher handle, the coordinator and job tasks.
//!
//! Every field is synchronized on its own. Reading the state and a counter is
//! not one atomic step.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use dispatch_core::{
    Diagnostics, DispatchEvent, DispatcherConfig, DispatcherState, JobHook, Stats,
};
use tokio::sync::{broadcast, watch};
use tracing::Level;

use crate::gate::ConcurrencyGate;

pub(crate) struct Shared {
    pub(crate) config: DispatcherConfig,
    pub(crate) stats: Stats,
    pub(crate) gate: ConcurrencyGate,
    pub(crate) diagnostics: Diagnostics,
    queued: AtomicUsize,
    start_requested: AtomicBool,
    stop_requested: AtomicBool,
    detached: AtomicBool,
    state_tx: watch::Sender<DispatcherState>,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl Shared {
    pub(crate) fn new(
        config: DispatcherConfig,
        diagnostics: Diagnostics,
        event_capacity: usize,
    ) -> Self {
        let (state_tx, _) = watch::channel(DispatcherState::Idle);
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            gate: ConcurrencyGate::new(config.workers),
            config,
            stats: Stats::new(),
            diagnostics,
            queued: AtomicUsize::new(0),
            start_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            state_tx,
            event_tx,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.config.display_name()
    }

    pub(crate) fn state(&self) -> DispatcherState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<DispatcherState> {
        self.state_tx.subscribe()
    }

    /// Move to `new_state`, broadcasting the change.
    pub(crate) fn set_state(&self, new_state: DispatcherState) {
        let old_state = self.state_tx.send_replace(new_state);
        if old_state == new_state {
            return;
        }
        tracing::info!(
            dispatcher = self.name(),
            "state {} -> {}",
            old_state,
            new_state
        );
        self.broadcast(DispatchEvent::StateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn set_queued(&self, len: usize) {
        self.queued.store(len, Ordering::Release);
    }

    /// Returns true only for the first call.
    pub(crate) fn request_start(&self) -> bool {
        !self.start_requested.swap(true, Ordering::AcqRel)
    }

    /// Returns true only for the first call.
    pub(crate) fn request_stop(&self) -> bool {
        !self.stop_requested.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Mark that no handle is left to send messages.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event. Having no subscribers is not an error.
    pub(crate) fn broadcast(&self, event: DispatchEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Log a per-job lifecycle step.
    pub(crate) fn trace_job(&self, job_id: &str, step: &str) {
        tracing::debug!(dispatcher = self.name(), job_id, "job {}", step);
        if self.diagnostics.enabled(Level::DEBUG) {
            self.diagnostics
                .debug(self.name(), &format!("job {} {}", job_id, step));
        }
    }

    /// Report a panic recovered from a job callback.
    pub(crate) fn report_panic(&self, job_id: &str, hook: JobHook, message: &str) {
        tracing::error!(
            dispatcher = self.name(),
            job_id,
            %hook,
            "job callback panicked: {}",
            message
        );
        if self.diagnostics.enabled(Level::ERROR) {
            self.diagnostics.error(
                self.name(),
                &format!("job {} panicked in {}: {}", job_id, hook, message),
            );
        }
        self.broadcast(DispatchEvent::CallbackPanicked {
            job_id: job_id.to_string(),
            hook,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}
