//! # Runtime
//!
//! The two seams the balancing core is built on: the [`Processor`] that
//! performs an actual unit of work and reports completion via callback, and
//! the [`Scheduler`] that runs queued continuations.

mod processor;
mod scheduler;

pub use processor::Processor;
pub use scheduler::{ManualScheduler, Scheduler, Task, TokioScheduler};
