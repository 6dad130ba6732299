//! Bounded-concurrency job dispatcher.
//!
//! A dispatcher admits jobs into a fixed-capacity FIFO queue and runs at most
//! `workers` of them at once, tracking how many were rejected, accepted,
//! cancelled and completed.
//!
//! # Architecture
//!
//! - `Dispatcher` - Cloneable handle used by producers
//! - `Coordinator` - Ractor actor that owns the queue and launches jobs
//! - `ConcurrencyGate` - Semaphore bounding the number of running jobs
//!
//! # Usage
//!
//! ```ignore
//! use dispatcher::{Dispatcher, DispatcherConfig, FnJob};
//!
//! let dispatcher = Dispatcher::spawn(DispatcherConfig::new(5, 10)).await?;
//! dispatcher.run();
//! dispatcher.add(FnJob::new("hello", || async { println!("hello") })).await;
//! dispatcher.stop();
//! dispatcher.wait_close().await;
//! ```

mod coordinator;
mod gate;
mod handle;
mod lifecycle;
mod messages;
mod shared;

pub use handle::{Dispatcher, DispatcherBuilder};
pub use gate::{ConcurrencyGate, GatePermit};
pub use messages::DispatchError;

/// Re-export core types for convenience.
pub use dispatch_core::{
    AdmissionMode, Diagnostics, DispatchEvent, DispatcherConfig, DispatcherState, FnJob, Job,
    JobFuture, JobHook, MAX_WORKERS, Stats, StatsSnapshot,
};
