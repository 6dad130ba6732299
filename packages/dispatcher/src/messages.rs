//! Message types for the coordinator actor.

use dispatch_core::Job;
use ractor::RpcReplyPort;

/// Messages for the coordinator.
#[derive(Debug)]
pub(crate) enum DispatcherMessage {
    /// Admit a job to the queue. The reply carries the verdict in blocking mode.
    Admit {
        job: Box<dyn Job>,
        reply: Option<RpcReplyPort<bool>>,
    },

    /// Start dispatching queued jobs.
    Start,

    /// Stop admitting jobs and drain or cancel the queue.
    Stop,

    /// Stop and release resources if nothing is running.
    Close {
        reply: RpcReplyPort<Result<(), DispatchError>>,
    },

    /// A launched job finished running or being cancelled.
    JobFinished,
}

/// Error type for dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher busy: {running} running, {queued} queued")]
    Busy { running: usize, queued: usize },

    #[error("Coordinator unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn coordinator: {0}")]
    Spawn(String),
}
