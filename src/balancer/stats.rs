//! Failure-classification statistics.

use crate::exchange::{ErrorClass, ProcessingError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks handled-failure counts per declared error class, plus a fallback
/// bucket for failures whose class was not declared.
///
/// Counters are plain atomics; increments are safe under unbounded
/// concurrent calls and never lost. Over time the sum of all counters
/// equals the total number of handled failures.
#[derive(Debug)]
pub struct FailureStatistics {
    counters: Vec<(ErrorClass, AtomicU64)>,
    fallback: AtomicU64,
}

impl FailureStatistics {
    /// Creates statistics seeded with a zero counter per declared class.
    #[must_use]
    pub fn new(classes: &[ErrorClass]) -> Self {
        let mut counters: Vec<(ErrorClass, AtomicU64)> = Vec::with_capacity(classes.len());
        for class in classes {
            if !counters.iter().any(|(c, _)| c == class) {
                counters.push((*class, AtomicU64::new(0)));
            }
        }
        Self {
            counters,
            fallback: AtomicU64::new(0),
        }
    }

    /// Records a handled failure.
    ///
    /// The counter for the failure's exact class is incremented when that
    /// class was declared; otherwise the fallback counter is.
    pub fn on_handled_failure(&self, error: &ProcessingError) {
        self.counter_for(error.class()).fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the failure count for a class.
    ///
    /// Querying a class that was never declared reads the shared fallback
    /// counter, mirroring the write-side degradation. That means two
    /// undeclared classes report the same aggregate number; callers who
    /// need per-class counts must declare the classes up front.
    #[must_use]
    pub fn failure_counter(&self, class: ErrorClass) -> u64 {
        self.counter_for(class).load(Ordering::Relaxed)
    }

    /// Returns the fallback-bucket count.
    #[must_use]
    pub fn fallback_counter(&self) -> u64 {
        self.fallback.load(Ordering::Relaxed)
    }

    /// Returns the declared classes, in declaration order.
    #[must_use]
    pub fn declared_classes(&self) -> Vec<ErrorClass> {
        self.counters.iter().map(|(class, _)| *class).collect()
    }

    /// Zeroes every counter, including the fallback bucket. The declared
    /// class set is retained.
    pub fn reset(&self) {
        for (_, counter) in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
        self.fallback.store(0, Ordering::Relaxed);
    }

    fn counter_for(&self, class: ErrorClass) -> &AtomicU64 {
        self.counters
            .iter()
            .find(|(declared, _)| *declared == class)
            .map_or(&self.fallback, |(_, counter)| counter)
    }
}
