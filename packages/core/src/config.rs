//! Dispatcher configuration and lifecycle state.

use serde::{Deserialize, Serialize};

/// Largest worker count a dispatcher accepts. Equal to the permit limit of
/// `tokio::sync::Semaphore`.
pub const MAX_WORKERS: usize = usize::MAX >> 3;

/// How `add` hands a job to the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// The caller waits until the job is queued or rejected.
    #[default]
    Blocking,
    /// The caller returns immediately; the verdict arrives through the job callbacks.
    Background,
}

impl std::fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionMode::Blocking => write!(f, "blocking"),
            AdmissionMode::Background => write!(f, "background"),
        }
    }
}

/// Configuration for a dispatcher, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Name used for the coordinator actor and in logs. Actor names must be unique.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Maximum number of jobs running at once.
    pub workers: usize,
    /// Maximum number of jobs waiting in the queue.
    pub queue_size: usize,
    /// Whether `add` waits for the queue.
    pub admission: AdmissionMode,
    /// Run queued jobs after a stop instead of cancelling them.
    pub drain_on_stop: bool,
    /// Invoke the accept/reject/cancel callbacks. When off, outcomes are only counted.
    pub full_lifecycle: bool,
    /// Write debug lines to the diagnostic sink.
    pub debug: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: None,
            workers: 4,
            queue_size: 100,
            admission: AdmissionMode::Blocking,
            drain_on_stop: true,
            full_lifecycle: true,
            debug: false,
        }
    }
}

impl DispatcherConfig {
    /// Create a config with the given worker count and queue capacity.
    pub fn new(workers: usize, queue_size: usize) -> Self {
        Self {
            workers,
            queue_size,
            ..Default::default()
        }
    }

    /// Parse a config from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the dispatcher name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the admission mode.
    pub fn with_admission(mut self, admission: AdmissionMode) -> Self {
        self.admission = admission;
        self
    }

    /// Set whether queued jobs run after a stop.
    pub fn with_drain_on_stop(mut self, drain_on_stop: bool) -> Self {
        self.drain_on_stop = drain_on_stop;
        self
    }

    /// Set whether accept/reject/cancel callbacks are invoked.
    pub fn with_full_lifecycle(mut self, full_lifecycle: bool) -> Self {
        self.full_lifecycle = full_lifecycle;
        self
    }

    /// Enable debug output on the diagnostic sink.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Coerce a zero worker count or queue capacity to one and cap the worker
    /// count at [`MAX_WORKERS`].
    pub fn normalized(mut self) -> Self {
        if self.workers == 0 {
            tracing::warn!("dispatcher configured with 0 workers, using 1");
            self.workers = 1;
        } else if self.workers > MAX_WORKERS {
            tracing::warn!(
                "dispatcher configured with {} workers, using {}",
                self.workers,
                MAX_WORKERS
            );
            self.workers = MAX_WORKERS;
        }
        if self.queue_size == 0 {
            tracing::warn!("dispatcher configured with queue size 0, using 1");
            self.queue_size = 1;
        }
        self
    }

    /// Name shown in logs.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("dispatcher")
    }
}

/// Current lifecycle state of a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Constructed but not started. Jobs are admitted but not dispatched.
    #[default]
    Idle,
    /// Admitting and dispatching jobs.
    Running,
    /// Stop requested; queued jobs still run.
    Draining,
    /// Stop requested; queued jobs are cancelled.
    Cancelling,
    /// Fully stopped. No job will ever be admitted again.
    Closed,
}

impl DispatcherState {
    /// Check if new jobs are admitted.
    pub fn is_accepting_jobs(&self) -> bool {
        matches!(self, DispatcherState::Idle | DispatcherState::Running)
    }

    /// Check if a stop has been observed but teardown has not finished.
    pub fn is_stopping(&self) -> bool {
        matches!(self, DispatcherState::Draining | DispatcherState::Cancelling)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, DispatcherState::Closed)
    }
}

impl std::fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "idle"),
            DispatcherState::Running => write!(f, "running"),
            DispatcherState::Draining => write!(f, "draining"),
            DispatcherState::Cancelling => write!(f, "cancelling"),
            DispatcherState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacities_are_coerced() {
        let config = DispatcherConfig::new(0, 0).normalized();
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_size, 1);

        let config = DispatcherConfig::new(5, 10).normalized();
        assert_eq!(config.workers, 5);
        assert_eq!(config.queue_size, 10);
    }

    #[test]
    fn oversized_worker_count_is_capped() {
        let config = DispatcherConfig::new(usize::MAX, usize::MAX).normalized();
        assert_eq!(config.workers, MAX_WORKERS);
        assert_eq!(config.queue_size, usize::MAX);

        let config = DispatcherConfig::from_json(r#"{"workers": 18446744073709551615}"#)
            .unwrap()
            .normalized();
        assert_eq!(config.workers, MAX_WORKERS);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            DispatcherConfig::from_json(r#"{"workers": 2, "admission": "background"}"#).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_size, 100);
        assert_eq!(config.admission, AdmissionMode::Background);
        assert!(config.drain_on_stop);
        assert!(config.full_lifecycle);
        assert!(config.name.is_none());
    }

    #[test]
    fn builder_methods_set_fields() {
        let config = DispatcherConfig::new(3, 7)
            .with_name("ingest")
            .with_admission(AdmissionMode::Background)
            .with_drain_on_stop(false)
            .with_full_lifecycle(false)
            .with_debug(true);
        assert_eq!(config.display_name(), "ingest");
        assert_eq!(config.admission, AdmissionMode::Background);
        assert!(!config.drain_on_stop);
        assert!(!config.full_lifecycle);
        assert!(config.debug);
        assert_eq!(DispatcherConfig::default().display_name(), "dispatcher");
    }

    #[test]
    fn state_predicates() {
        assert!(DispatcherState::Idle.is_accepting_jobs());
        assert!(DispatcherState::Running.is_accepting_jobs());
        assert!(!DispatcherState::Draining.is_accepting_jobs());
        assert!(DispatcherState::Cancelling.is_stopping());
        assert!(!DispatcherState::Running.is_stopping());
        assert!(DispatcherState::Closed.is_closed());
        assert_eq!(DispatcherState::Draining.to_string(), "draining");
    }
}
