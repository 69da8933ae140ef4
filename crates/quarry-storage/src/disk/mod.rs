//! Disk layer: raw page I/O and its scheduling.
//!
//! Two pieces live here:
//!
//! - [`DiskManager`]: a synchronous, file-backed page store. It carries no
//!   internal locking because exactly one thread (the scheduler's worker)
//!   ever touches it.
//! - [`DiskScheduler`]: owns that worker and a bounded FIFO of
//!   [`DiskRequest`]s. Callers enqueue requests and, when they care about
//!   the outcome, block on a one-shot completion signal.
//!
//! Because there is a single worker, all disk operations execute in the
//! order they were dequeued; callers that need cross-thread ordering must
//! serialize their `schedule` calls themselves.

mod manager;
mod scheduler;

pub use manager::{DiskError, DiskManager, DiskResult};
pub use scheduler::{DiskRequest, DiskScheduler, IoFuture, IoPromise};
