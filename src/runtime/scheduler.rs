//! Continuation scheduling.
//!
//! The balancer never invokes retry continuations inline; every step is
//! handed to a [`Scheduler`] so stack depth stays bounded across many
//! retries and no caller thread is ever blocked.

use std::collections::VecDeque;
use std::sync::Mutex;

/// A queued continuation.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Enqueues zero-argument continuations for later execution on some worker.
pub trait Scheduler: Send + Sync {
    /// Schedules a task for execution.
    fn schedule(&self, task: Task);
}

/// Scheduler that spawns continuations onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Creates a scheduler bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Creates a scheduler bound to the given runtime handle.
    #[must_use]
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn(async move {
            task();
        });
    }
}

/// Single-threaded trampoline scheduler.
///
/// Tasks are queued and only executed when the owner drains the queue with
/// [`ManualScheduler::run_until_idle`]. Deterministic, so the natural choice
/// for tests and for drivers that pump continuations from their own loop.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().expect("scheduler queue poisoned").len()
    }

    /// Runs queued tasks, including ones they enqueue, until none remain.
    ///
    /// Returns the number of tasks executed.
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        loop {
            let task = self
                .queue
                .lock()
                .expect("scheduler queue poisoned")
                .pop_front();
            match task {
                Some(task) => {
                    task();
                    executed += 1;
                },
                None => return executed,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        self.queue
            .lock()
            .expect("scheduler queue poisoned")
            .push_back(task);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
