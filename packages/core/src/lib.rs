//! Core domain types for the bounded job dispatcher.
//!
//! This crate contains the types shared by the dispatcher and its callers:
//! - `Job` and `FnJob` for units of work and their lifecycle callbacks
//! - `DispatcherConfig` and `DispatcherState` for configuration and lifecycle
//! - `Stats` for the rejected/accepted/cancelled/completed counters
//! - `DispatchEvent` for real-time updates
//! - `Diagnostics` for the optional debug sink

mod config;
mod diagnostics;
mod events;
mod job;
mod stats;

pub use config::{AdmissionMode, DispatcherConfig, DispatcherState, MAX_WORKERS};
pub use diagnostics::Diagnostics;
pub use events::DispatchEvent;
pub use job::{FnJob, Job, JobFuture, JobHook};
pub use stats::{Counter, Stats, StatsSnapshot};
