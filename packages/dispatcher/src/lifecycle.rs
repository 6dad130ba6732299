//! Per-job callback invocation.
//!
//! Every user callback runs inside a panic boundary. A panic is reported and
//! the job still counts toward the outcome it was heading for.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dispatch_core::{DispatchEvent, Job, JobHook};
use futures_util::FutureExt;
use ractor::ActorRef;

use crate::gate::GatePermit;
use crate::messages::DispatcherMessage;
use crate::shared::Shared;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Invoke accept, reject or cancel. Skipped when full lifecycle callbacks are off.
fn invoke_hook(shared: &Shared, job: &dyn Job, hook: JobHook) {
    if !shared.config.full_lifecycle {
        return;
    }
    let result = panic::catch_unwind(AssertUnwindSafe(|| match hook {
        JobHook::Accept => job.accept(),
        JobHook::Reject => job.reject(),
        JobHook::Cancel => job.cancel(),
        JobHook::Run => {}
    }));
    if let Err(payload) = result {
        shared.report_panic(job.id(), hook, &panic_message(&*payload));
    }
}

pub(crate) fn accept(shared: &Shared, job: &dyn Job) {
    invoke_hook(shared, job, JobHook::Accept);
    shared.stats.record_accepted();
    shared.trace_job(job.id(), "accepted");
    shared.broadcast(DispatchEvent::JobAccepted {
        job_id: job.id().to_string(),
        timestamp: Utc::now(),
    });
}

pub(crate) fn reject(shared: &Shared, job: &dyn Job) {
    invoke_hook(shared, job, JobHook::Reject);
    shared.stats.record_rejected();
    shared.trace_job(job.id(), "rejected");
    shared.broadcast(DispatchEvent::JobRejected {
        job_id: job.id().to_string(),
        timestamp: Utc::now(),
    });
}

pub(crate) fn cancel(shared: &Shared, job: &dyn Job) {
    invoke_hook(shared, job, JobHook::Cancel);
    shared.stats.record_cancelled();
    shared.trace_job(job.id(), "cancelled");
    shared.broadcast(DispatchEvent::JobCancelled {
        job_id: job.id().to_string(),
        timestamp: Utc::now(),
    });
}

/// Run the job future. Returns false if creating or polling it panicked.
async fn run_guarded(shared: &Shared, job: &dyn Job) -> bool {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(payload) => Err(payload),
    };
    match outcome {
        Ok(()) => true,
        Err(payload) => {
            shared.report_panic(job.id(), JobHook::Run, &panic_message(&*payload));
            false
        }
    }
}

/// Run a job on its own task, holding `permit` until it finishes.
pub(crate) fn spawn_run(
    shared: Arc<Shared>,
    job: Box<dyn Job>,
    permit: GatePermit,
    coordinator: ActorRef<DispatcherMessage>,
) {
    tokio::spawn(async move {
        shared.trace_job(job.id(), "started");
        shared.broadcast(DispatchEvent::JobStarted {
            job_id: job.id().to_string(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let panicked = !run_guarded(&shared, job.as_ref()).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        shared.stats.record_completed();
        shared.trace_job(job.id(), "completed");
        shared.broadcast(DispatchEvent::JobCompleted {
            job_id: job.id().to_string(),
            duration_ms,
            panicked,
            timestamp: Utc::now(),
        });

        drop(permit);
        let _ = coordinator.send_message(DispatcherMessage::JobFinished);
    });
}

/// Cancel a dequeued job on its own task, holding `permit` until it finishes.
pub(crate) fn spawn_cancel(
    shared: Arc<Shared>,
    job: Box<dyn Job>,
    permit: GatePermit,
    coordinator: ActorRef<DispatcherMessage>,
) {
    tokio::spawn(async move {
        cancel(&shared, job.as_ref());
        drop(permit);
        let _ = coordinator.send_message(DispatcherMessage::JobFinished);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{Diagnostics, DispatcherConfig, FnJob};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared(config: DispatcherConfig) -> Shared {
        Shared::new(config.normalized(), Diagnostics::disabled(), 16)
    }

    #[test]
    fn panic_message_handles_str_and_string() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    #[test]
    fn panicking_reject_is_contained_and_counted() {
        let shared = shared(DispatcherConfig::new(1, 1));
        let mut events = shared.subscribe();
        let job = FnJob::new("bad-reject", || async {}).on_reject(|| {
            panic!("reject failed");
        });

        reject(&shared, &job);

        assert_eq!(shared.stats.snapshot().rejected, 1);
        match events.try_recv() {
            Ok(DispatchEvent::CallbackPanicked { hook, message, .. }) => {
                assert_eq!(hook, JobHook::Reject);
                assert_eq!(message, "reject failed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn hooks_skipped_without_full_lifecycle() {
        let shared = shared(DispatcherConfig::new(1, 1).with_full_lifecycle(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, c) = (calls.clone(), calls.clone());
        let job = FnJob::new("limiter", || async {})
            .on_accept(move || {
                a.fetch_add(1, Ordering::SeqCst);
            })
            .on_cancel(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });

        accept(&shared, &job);
        cancel(&shared, &job);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let stats = shared.stats.snapshot();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[tokio::test]
    async fn run_guarded_reports_panics() {
        let shared = shared(DispatcherConfig::new(1, 1));
        let ok = FnJob::new("ok", || async {});
        let bad = FnJob::new("bad", || async {
            panic!("boom");
        });

        assert!(run_guarded(&shared, &ok).await);
        assert!(!run_guarded(&shared, &bad).await);
    }
}
