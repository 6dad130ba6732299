//! Coordinator actor owning the bounded queue.

use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use dispatch_core::{DispatchEvent, DispatcherState, Job};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::Level;

use crate::lifecycle;
use crate::messages::{DispatchError, DispatcherMessage};
use crate::shared::Shared;

/// Upper bound on the queue's initial allocation. Larger queues grow on demand.
const INITIAL_QUEUE_CAPACITY: usize = 1024;

/// Callback invoked once the dispatcher has closed.
pub(crate) type ExitHook = Box<dyn FnOnce() + Send>;

/// A job waiting for room in the queue.
struct Admission {
    job: Box<dyn Job>,
    reply: Option<RpcReplyPort<bool>>,
}

/// State for the coordinator actor.
pub(crate) struct CoordinatorState {
    shared: Arc<Shared>,
    /// Admitted jobs in FIFO order. Never longer than the configured queue size.
    queue: VecDeque<Box<dyn Job>>,
    /// Admissions that arrived while the queue was full, in arrival order.
    waiting: VecDeque<Admission>,
    /// Jobs launched on a task that have not reported back yet.
    in_flight: usize,
    started: bool,
    stopping: bool,
    closed: bool,
    on_exit: Option<ExitHook>,
}

impl CoordinatorState {
    pub(crate) fn new(shared: Arc<Shared>, on_exit: Option<ExitHook>) -> Self {
        let capacity = shared.config.queue_size.min(INITIAL_QUEUE_CAPACITY);
        Self {
            shared,
            queue: VecDeque::with_capacity(capacity),
            waiting: VecDeque::new(),
            in_flight: 0,
            started: false,
            stopping: false,
            closed: false,
            on_exit,
        }
    }

    fn capacity(&self) -> usize {
        self.shared.config.queue_size
    }

    fn admit(&mut self, admission: Admission) {
        if self.stopping || self.closed {
            self.refuse(admission);
        } else if self.waiting.is_empty() && self.queue.len() < self.capacity() {
            self.enqueue(admission);
        } else {
            self.waiting.push_back(admission);
        }
    }

    fn enqueue(&mut self, admission: Admission) {
        let Admission { job, reply } = admission;
        lifecycle::accept(&self.shared, job.as_ref());
        self.queue.push_back(job);
        self.shared.set_queued(self.queue.len());
        if let Some(reply) = reply {
            let _ = reply.send(true);
        }
    }

    fn refuse(&self, admission: Admission) {
        let Admission { job, reply } = admission;
        lifecycle::reject(&self.shared, job.as_ref());
        if let Some(reply) = reply {
            let _ = reply.send(false);
        }
    }

    fn start(&mut self) {
        if self.started || self.stopping || self.closed {
            return;
        }
        self.started = true;
        self.shared.set_state(DispatcherState::Running);
    }

    /// Stop admitting. Queued jobs keep flowing through the gate and are run or
    /// cancelled depending on the drain policy.
    fn begin_stop(&mut self) {
        if self.stopping || self.closed {
            return;
        }
        self.stopping = true;
        // Stopping an idle dispatcher still has to empty its queue.
        self.started = true;

        let next = if self.shared.config.drain_on_stop {
            DispatcherState::Draining
        } else {
            DispatcherState::Cancelling
        };
        self.shared.set_state(next);

        for admission in mem::take(&mut self.waiting) {
            self.refuse(admission);
        }
    }

    /// Launch queued jobs and refill the queue until neither makes progress.
    fn pump(&mut self, myself: &ActorRef<DispatcherMessage>) {
        loop {
            let launched = self.dispatch_ready(myself);
            let admitted = self.admit_waiting();
            if launched == 0 && admitted == 0 {
                break;
            }
        }
        self.shared.set_queued(self.queue.len());
    }

    fn dispatch_ready(&mut self, myself: &ActorRef<DispatcherMessage>) -> usize {
        if !self.started || self.closed {
            return 0;
        }

        let mut launched = 0;
        while !self.queue.is_empty() {
            let Some(permit) = self.shared.gate.try_acquire() else {
                break;
            };
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.in_flight += 1;
            launched += 1;

            if self.stopping && !self.shared.config.drain_on_stop {
                lifecycle::spawn_cancel(self.shared.clone(), job, permit, myself.clone());
            } else {
                lifecycle::spawn_run(self.shared.clone(), job, permit, myself.clone());
            }
        }
        launched
    }

    fn admit_waiting(&mut self) -> usize {
        if self.stopping || self.closed {
            return 0;
        }

        let mut admitted = 0;
        while self.queue.len() < self.capacity() {
            let Some(admission) = self.waiting.pop_front() else {
                break;
            };
            self.enqueue(admission);
            admitted += 1;
        }
        admitted
    }

    /// Close synchronously. Queued jobs are discarded when draining is off.
    fn close(&mut self) -> Result<(), DispatchError> {
        if self.closed {
            return Ok(());
        }
        self.begin_stop();

        if !self.shared.config.drain_on_stop {
            for job in mem::take(&mut self.queue) {
                lifecycle::cancel(&self.shared, job.as_ref());
            }
            self.shared.set_queued(0);
        }

        if self.in_flight > 0 || !self.queue.is_empty() {
            return Err(DispatchError::Busy {
                running: self.in_flight,
                queued: self.queue.len(),
            });
        }

        self.teardown();
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.stopping && self.queue.is_empty() && self.waiting.is_empty() && self.in_flight == 0
    }

    /// Release resources. Runs at most once.
    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.queue = VecDeque::new();
        self.waiting = VecDeque::new();
        self.shared.set_queued(0);
        self.shared.gate.close();

        if let Some(on_exit) = self.on_exit.take()
            && let Err(payload) = panic::catch_unwind(AssertUnwindSafe(on_exit))
        {
            let message = lifecycle::panic_message(&*payload);
            tracing::error!(
                dispatcher = self.shared.name(),
                "exit callback panicked: {}",
                message
            );
            if self.shared.diagnostics.enabled(Level::ERROR) {
                self.shared.diagnostics.error(
                    self.shared.name(),
                    &format!("exit callback panicked: {}", message),
                );
            }
        }

        let stats = self.shared.stats.snapshot();
        self.shared.set_state(DispatcherState::Closed);
        self.shared.broadcast(DispatchEvent::Closed {
            stats,
            timestamp: Utc::now(),
        });
        tracing::info!(dispatcher = self.shared.name(), %stats, "dispatcher closed");
    }

    /// Settle everything still owned when the actor stops before closing.
    fn abandon(&mut self) {
        if self.closed {
            return;
        }
        self.stopping = true;
        for admission in mem::take(&mut self.waiting) {
            self.refuse(admission);
        }
        for job in mem::take(&mut self.queue) {
            lifecycle::cancel(&self.shared, job.as_ref());
        }
        self.teardown();
    }
}

/// Coordinator actor that admits, queues and launches jobs.
pub(crate) struct Coordinator;

impl Actor for Coordinator {
    type Msg = DispatcherMessage;
    type State = CoordinatorState;
    type Arguments = CoordinatorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(dispatcher = args.shared.name(), "starting coordinator");
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DispatcherMessage::Admit { job, reply } => {
                state.admit(Admission { job, reply });
            }

            DispatcherMessage::Start => state.start(),

            DispatcherMessage::Stop => state.begin_stop(),

            DispatcherMessage::Close { reply } => {
                let result = state.close();
                let _ = reply.send(result);
            }

            DispatcherMessage::JobFinished => {
                state.in_flight = state.in_flight.saturating_sub(1);
            }
        }

        if !state.closed {
            state.pump(&myself);
            if state.is_drained() {
                state.teardown();
            }
        }

        // Nobody can send to a closed coordinator once every handle is gone.
        if state.closed && state.shared.is_detached() {
            myself.stop(None);
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.abandon();
        tracing::debug!(dispatcher = state.shared.name(), "coordinator stopped");
        Ok(())
    }
}
