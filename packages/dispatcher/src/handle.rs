//! Public handle for a running dispatcher.

use std::io;
use std::sync::Arc;

use dispatch_core::{
    AdmissionMode, Diagnostics, DispatchEvent, DispatcherConfig, DispatcherState, Job,
    StatsSnapshot,
};
use ractor::{Actor, ActorRef, MessagingErr};
use tokio::sync::broadcast;

use crate::coordinator::{Coordinator, CoordinatorState, ExitHook};
use crate::lifecycle;
use crate::messages::{DispatchError, DispatcherMessage};
use crate::shared::Shared;

/// Builder for a [`Dispatcher`] with optional collaborators.
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    diagnostics: Diagnostics,
    on_exit: Option<ExitHook>,
    event_capacity: usize,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::disabled(),
            on_exit: None,
            event_capacity: 1024,
        }
    }

    /// Write recovered panics, and per-job lines when `debug` is set, to `out`.
    pub fn with_diagnostics(mut self, out: impl io::Write + Send + 'static) -> Self {
        self.diagnostics = Diagnostics::new(out, false);
        self
    }

    /// Run `f` once after the dispatcher has released its resources.
    pub fn on_exit(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }

    /// Set the buffer size of the event channel.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Spawn the coordinator actor. The dispatcher starts idle; call
    /// [`Dispatcher::run`] to begin executing jobs.
    pub async fn spawn(self) -> Result<Dispatcher, DispatchError> {
        let config = self.config.normalized();
        let diagnostics = self.diagnostics.with_debug(config.debug);
        let shared = Arc::new(Shared::new(config, diagnostics, self.event_capacity));

        let state = CoordinatorState::new(shared.clone(), self.on_exit);
        let (actor, _handle) = Actor::spawn(shared.config.name.clone(), Coordinator, state)
            .await
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        tracing::info!(
            dispatcher = shared.name(),
            workers = shared.config.workers,
            queue_size = shared.config.queue_size,
            admission = %shared.config.admission,
            drain_on_stop = shared.config.drain_on_stop,
            "dispatcher spawned"
        );

        Ok(Dispatcher {
            inner: Arc::new(Inner { shared, actor }),
        })
    }
}

struct Inner {
    shared: Arc<Shared>,
    actor: ActorRef<DispatcherMessage>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone: nothing can add or close any more, so finish up.
        self.shared.detach();
        self.shared.request_stop();
        let _ = self.actor.send_message(DispatcherMessage::Stop);
    }
}

/// Handle to a bounded-concurrency job dispatcher.
///
/// Cloning is cheap and every clone refers to the same dispatcher. When the last
/// clone is dropped the dispatcher stops, settles its queue and shuts down.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder(config: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Spawn a dispatcher with no diagnostics sink or exit callback.
    pub async fn spawn(config: DispatcherConfig) -> Result<Self, DispatchError> {
        DispatcherBuilder::new(config).spawn().await
    }

    /// Start executing queued jobs. Later calls do nothing.
    pub fn run(&self) {
        if !self.inner.shared.request_start() {
            return;
        }
        tracing::info!(dispatcher = self.name(), "starting dispatcher");
        let _ = self.inner.actor.send_message(DispatcherMessage::Start);
    }

    /// Stop admitting jobs and shut down in the background. Queued jobs are run
    /// or cancelled depending on `drain_on_stop`. Later calls do nothing.
    pub fn stop(&self) {
        if !self.inner.shared.request_stop() {
            return;
        }
        tracing::info!(dispatcher = self.name(), "stopping dispatcher");
        let _ = self.inner.actor.send_message(DispatcherMessage::Stop);
    }

    /// Submit a job. Returns false if it was rejected.
    ///
    /// In blocking mode this waits until the job is queued or refused. In
    /// background mode it returns true as soon as the coordinator has the job;
    /// the job may still be rejected later if the dispatcher stops first.
    pub async fn add(&self, job: impl Job) -> bool {
        self.add_boxed(Box::new(job)).await
    }

    pub async fn add_boxed(&self, job: Box<dyn Job>) -> bool {
        let shared = &self.inner.shared;
        if !shared.state().is_accepting_jobs() || shared.stop_requested() {
            lifecycle::reject(shared, job.as_ref());
            return false;
        }

        match shared.config.admission {
            AdmissionMode::Background => self.send_admit(job, None),
            AdmissionMode::Blocking => {
                let (tx, rx) = ractor::concurrency::oneshot();
                if !self.send_admit(job, Some(tx.into())) {
                    return false;
                }
                rx.await.unwrap_or(false)
            }
        }
    }

    fn send_admit(&self, job: Box<dyn Job>, reply: Option<ractor::RpcReplyPort<bool>>) -> bool {
        match self
            .inner
            .actor
            .send_message(DispatcherMessage::Admit { job, reply })
        {
            Ok(()) => true,
            Err(MessagingErr::SendErr(DispatcherMessage::Admit { job, .. })) => {
                lifecycle::reject(&self.inner.shared, job.as_ref());
                false
            }
            Err(e) => {
                tracing::warn!(dispatcher = self.name(), "failed to admit job: {}", e);
                false
            }
        }
    }

    /// Wait until the dispatcher has fully shut down.
    pub async fn wait_close(&self) {
        let mut state_rx = self.inner.shared.subscribe_state();
        let _ = state_rx.wait_for(|state| state.is_closed()).await;
    }

    /// Stop and shut down now if nothing is running.
    ///
    /// With `drain_on_stop` off, queued jobs are cancelled first. Returns
    /// [`DispatchError::Busy`] while jobs are still running or waiting to drain;
    /// the shutdown then completes in the background. Calling this on a closed
    /// dispatcher returns `Ok(())`.
    pub async fn close(&self) -> Result<(), DispatchError> {
        let shared = &self.inner.shared;
        if shared.state().is_closed() {
            return Ok(());
        }
        shared.request_stop();

        let (tx, rx) = ractor::concurrency::oneshot();
        if let Err(e) = self
            .inner
            .actor
            .send_message(DispatcherMessage::Close { reply: tx.into() })
        {
            return self.closed_or(DispatchError::Unavailable(e.to_string()));
        }

        match rx.await {
            Ok(result) => result,
            Err(e) => self.closed_or(DispatchError::Unavailable(e.to_string())),
        }
    }

    fn closed_or(&self, err: DispatchError) -> Result<(), DispatchError> {
        if self.state().is_closed() {
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Check if the dispatcher still accepts jobs or has work outstanding.
    pub fn is_active(&self) -> bool {
        let state = self.state();
        !state.is_closed() && (state.is_accepting_jobs() || self.queue() > 0 || self.running() > 0)
    }

    /// Number of jobs waiting in the queue.
    pub fn queue(&self) -> usize {
        self.inner.shared.queued()
    }

    /// Number of jobs currently running or being cancelled.
    pub fn running(&self) -> usize {
        self.inner.shared.gate.in_use()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }

    pub fn state(&self) -> DispatcherState {
        self.inner.shared.state()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.shared.config
    }

    pub fn name(&self) -> &str {
        self.inner.shared.name()
    }

    /// Subscribe to dispatcher events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.shared.subscribe()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("queue", &self.queue())
            .field("running", &self.running())
            .finish()
    }
}
