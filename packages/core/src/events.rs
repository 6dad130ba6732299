//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DispatcherState, JobHook, StatsSnapshot};

/// Events emitted by a dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    // Job events
    /// A job was admitted to the queue.
    JobAccepted {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was refused.
    JobRejected {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job left the queue and started running.
    JobStarted {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job finished running. A panicking run still counts as completed.
    JobCompleted {
        job_id: String,
        duration_ms: u64,
        panicked: bool,
        timestamp: DateTime<Utc>,
    },
    /// A queued job was removed without running.
    JobCancelled {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job callback panicked and the panic was contained.
    CallbackPanicked {
        job_id: String,
        hook: JobHook,
        message: String,
        timestamp: DateTime<Utc>,
    },

    // Dispatcher events
    /// The dispatcher moved to a new lifecycle state.
    StateChanged {
        old_state: DispatcherState,
        new_state: DispatcherState,
        timestamp: DateTime<Utc>,
    },
    /// The dispatcher released its resources.
    Closed {
        stats: StatsSnapshot,
        timestamp: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Get the job this event refers to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            DispatchEvent::JobAccepted { job_id, .. }
            | DispatchEvent::JobRejected { job_id, .. }
            | DispatchEvent::JobStarted { job_id, .. }
            | DispatchEvent::JobCompleted { job_id, .. }
            | DispatchEvent::JobCancelled { job_id, .. }
            | DispatchEvent::CallbackPanicked { job_id, .. } => Some(job_id),
            DispatchEvent::StateChanged { .. } | DispatchEvent::Closed { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            DispatchEvent::JobAccepted { job_id, .. } => format!("Job {} accepted", job_id),
            DispatchEvent::JobRejected { job_id, .. } => format!("Job {} rejected", job_id),
            DispatchEvent::JobStarted { job_id, .. } => format!("Job {} started", job_id),
            DispatchEvent::JobCompleted {
                job_id,
                duration_ms,
                panicked,
                ..
            } => {
                let note = if *panicked { " (panicked)" } else { "" };
                format!("Job {} completed in {}ms{}", job_id, duration_ms, note)
            }
            DispatchEvent::JobCancelled { job_id, .. } => format!("Job {} cancelled", job_id),
            DispatchEvent::CallbackPanicked {
                job_id,
                hook,
                message,
                ..
            } => format!("Job {} panicked in {}: {}", job_id, hook, message),
            DispatchEvent::StateChanged {
                old_state,
                new_state,
                ..
            } => format!("Dispatcher {} -> {}", old_state, new_state),
            DispatchEvent::Closed { stats, .. } => format!("Dispatcher closed: {}", stats),
        }
    }
}
