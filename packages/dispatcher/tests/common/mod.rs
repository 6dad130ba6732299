#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dispatcher::{Dispatcher, Job, JobFuture};
use tokio::sync::watch;
use tokio::time::Instant;

/// Callback counts recorded by one or more probe jobs.
#[derive(Debug, Default)]
pub struct Calls {
    pub runs: AtomicUsize,
    pub accepts: AtomicUsize,
    pub rejects: AtomicUsize,
    pub cancels: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Calls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn rejects(&self) -> usize {
        self.rejects.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Highest number of probe runs observed at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of terminal callbacks (run, reject or cancel) seen so far.
    pub fn settled(&self) -> usize {
        self.runs() + self.rejects() + self.cancels()
    }
}

/// Job that records every callback and optionally sleeps, panics or waits
/// for a release signal while running.
pub struct Probe {
    id: String,
    calls: Arc<Calls>,
    work: Duration,
    panic_with: Option<&'static str>,
    hold: Option<watch::Receiver<bool>>,
}

impl Probe {
    pub fn new(id: impl Into<String>, calls: &Arc<Calls>) -> Self {
        Self {
            id: id.into(),
            calls: calls.clone(),
            work: Duration::ZERO,
            panic_with: None,
            hold: None,
        }
    }

    pub fn sleeping(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn panicking(mut self, message: &'static str) -> Self {
        self.panic_with = Some(message);
        self
    }

    /// Keep running until `hold` sees `true`.
    pub fn held(mut self, hold: &Hold) -> Self {
        self.hold = Some(hold.receiver());
        self
    }
}

impl Job for Probe {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self) -> JobFuture {
        let calls = self.calls.clone();
        let work = self.work;
        let panic_with = self.panic_with;
        let hold = self.hold.clone();
        Box::pin(async move {
            calls.runs.fetch_add(1, Ordering::SeqCst);
            let active = calls.active.fetch_add(1, Ordering::SeqCst) + 1;
            calls.peak.fetch_max(active, Ordering::SeqCst);

            if !work.is_zero() {
                tokio::time::sleep(work).await;
            }
            if let Some(mut hold) = hold {
                let _ = hold.wait_for(|released| *released).await;
            }

            calls.active.fetch_sub(1, Ordering::SeqCst);
            if let Some(message) = panic_with {
                panic!("{}", message);
            }
        })
    }

    fn accept(&self) {
        self.calls.accepts.fetch_add(1, Ordering::SeqCst);
    }

    fn reject(&self) {
        self.calls.rejects.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.calls.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Release switch for held probes.
pub struct Hold {
    tx: watch::Sender<bool>,
}

impl Hold {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    fn receiver(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn release(&self) {
        self.tx.send_replace(true);
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Wait for the dispatcher to close, failing the test after a generous timeout.
pub async fn wait_closed(dispatcher: &Dispatcher) {
    tokio::time::timeout(Duration::from_secs(10), dispatcher.wait_close())
        .await
        .expect("dispatcher did not close in time");
}
