//! cotask — cooperative single-threaded multitasking
//!
//! Many logical tasks are interleaved on one execution context by resuming
//! each task for one step at a time. This removes the need for true
//! concurrency (and its cross-context access hazards) in hosts that mandate
//! single-threaded access to their state, while still letting independent
//! activities appear to run at the same time.
//!
//! # Example
//!
//! ```
//! use cotask::scheduler::{from_iter, Scheduler};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.spawn(|| from_iter(0..3), None);
//! scheduler.spawn(|| from_iter("abc".chars()), None);
//! scheduler.run();
//! assert!(scheduler.is_empty());
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod bridge;
pub mod scheduler;
pub mod timers;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use scheduler::{
    Callback, Coroutine, Resume, Scheduler, SchedulerError, Step, Task, TaskId, TaskValue,
};
pub use timers::{AwaitTimer, DelayTimer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
