//! Job abstraction for units of work handed to a dispatcher.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Future type returned by [`Job::run`].
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A unit of work with lifecycle callbacks.
///
/// For every job handed to a dispatcher exactly one of `run`, `reject` or `cancel`
/// is invoked. `accept` is invoked first whenever the job makes it into the queue,
/// so an accepted job is always followed by either `run` or `cancel`.
///
/// A job is never preempted. If the future returned by `run` never completes, the
/// worker slot it occupies is never released and the dispatcher cannot close.
pub trait Job: Send + Sync + 'static {
    /// Identifier used in diagnostics only. Not used for ordering or deduplication.
    fn id(&self) -> &str;

    /// Create the future that performs the work.
    fn run(&self) -> JobFuture;

    /// Called once the job has been admitted to the queue.
    fn accept(&self) {}

    /// Called when the dispatcher refuses the job.
    fn reject(&self) {}

    /// Called when an admitted job is removed from the queue without running.
    fn cancel(&self) {}
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id()).finish()
    }
}

/// Names one of the callbacks of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobHook {
    Run,
    Accept,
    Reject,
    Cancel,
}

impl JobHook {
    pub fn as_str(self) -> &'static str {
        match self {
            JobHook::Run => "run",
            JobHook::Accept => "accept",
            JobHook::Reject => "reject",
            JobHook::Cancel => "cancel",
        }
    }
}

impl fmt::Display for JobHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type RunFn = Box<dyn Fn() -> JobFuture + Send + Sync>;
type HookFn = Box<dyn Fn() + Send + Sync>;

/// A closure-based job.
///
/// Only the run function is required; the accept, reject and cancel callbacks
/// default to no-ops.
pub struct FnJob {
    id: String,
    run: RunFn,
    on_accept: Option<HookFn>,
    on_reject: Option<HookFn>,
    on_cancel: Option<HookFn>,
}

impl FnJob {
    /// Create a job from an identifier and an async run function.
    pub fn new<F, Fut>(id: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: id.into(),
            run: Box::new(move || Box::pin(run())),
            on_accept: None,
            on_reject: None,
            on_cancel: None,
        }
    }

    /// Create a job with a generated ULID identifier.
    pub fn anonymous<F, Fut>(run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(Ulid::new().to_string(), run)
    }

    /// Set the callback invoked when the job is admitted.
    pub fn on_accept(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_accept = Some(Box::new(f));
        self
    }

    /// Set the callback invoked when the job is rejected.
    pub fn on_reject(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Box::new(f));
        self
    }

    /// Set the callback invoked when the job is cancelled.
    pub fn on_cancel(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob")
            .field("id", &self.id)
            .field("on_accept", &self.on_accept.is_some())
            .field("on_reject", &self.on_reject.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

impl Job for FnJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self) -> JobFuture {
        (self.run)()
    }

    fn accept(&self) {
        if let Some(f) = &self.on_accept {
            f();
        }
    }

    fn reject(&self) {
        if let Some(f) = &self.on_reject {
            f();
        }
    }

    fn cancel(&self) {
        if let Some(f) = &self.on_cancel {
            f();
        }
    }
}
