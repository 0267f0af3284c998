//! Exception-triggered failover balancer.

use super::config::FailoverConfig;
use super::error::{BalancerError, BalancerResult};
use super::registry::{BalancerCore, ProcessorSnapshot};
use super::stats::FailureStatistics;
use crate::exchange::{DoneCallback, ErrorClass, Exchange, ProcessingError};
use crate::runtime::{Processor, Scheduler};
use crate::service::{MetricsPayload, Service, ServiceResult, ServiceStatus};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Balancer that attempts processors in sequence until one completes
/// without a retriable failure.
///
/// A candidate order is picked per invocation: sticky resumes from the last
/// known-good index, round-robin advances a shared cursor, and plain mode
/// starts at index 0. When an attempt fails with an error matching the
/// declared classes (any error, if none were declared), the next candidate
/// is tried, bounded by `maximum_failover_attempts`. Each attempt runs
/// against a fresh copy of the caller's exchange; only the terminal
/// attempt's results are merged back.
///
/// All retry continuations are rescheduled through the [`Scheduler`], so
/// stack depth stays bounded and the caller thread is never blocked. The
/// only state shared between concurrent invocations is the round-robin
/// cursor, the last-good index and the statistics, all atomics.
pub struct FailoverBalancer {
    inner: Arc<Inner>,
}

struct Inner {
    core: BalancerCore,
    scheduler: Arc<dyn Scheduler>,
    exceptions: Vec<ErrorClass>,
    round_robin: bool,
    sticky: bool,
    maximum_failover_attempts: i64,
    /// Last index handed out by round-robin selection; -1 before the first.
    cursor: AtomicI64,
    /// Index of the processor behind the most recent terminal success;
    /// -1 until one happens. Never updated on an exhausted failure.
    last_good_index: AtomicI64,
    statistics: FailureStatistics,
    dispatches: AtomicU64,
    failovers: AtomicU64,
}

impl FailoverBalancer {
    /// Creates a failover balancer from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`super::BalancerError::Config`] if the settings are
    /// invalid.
    pub fn new(scheduler: Arc<dyn Scheduler>, config: FailoverConfig) -> BalancerResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                core: BalancerCore::new("failover"),
                scheduler,
                statistics: FailureStatistics::new(&config.exceptions),
                exceptions: config.exceptions,
                round_robin: config.round_robin,
                sticky: config.sticky,
                maximum_failover_attempts: config.maximum_failover_attempts,
                cursor: AtomicI64::new(-1),
                last_good_index: AtomicI64::new(-1),
                dispatches: AtomicU64::new(0),
                failovers: AtomicU64::new(0),
            }),
        })
    }

    /// Appends a downstream processor.
    pub fn add_processor(&self, processor: Arc<dyn Processor>) {
        self.inner.core.registry().add(processor);
    }

    /// Removes the first entry referencing the same processor; no-op if
    /// absent.
    pub fn remove_processor(&self, processor: &Arc<dyn Processor>) -> bool {
        self.inner.core.registry().remove(processor)
    }

    /// Returns a stable snapshot of the current processors.
    #[must_use]
    pub fn processors(&self) -> ProcessorSnapshot {
        self.inner.core.registry().snapshot()
    }

    /// Returns `true` if any processors are registered.
    #[must_use]
    pub fn has_processors(&self) -> bool {
        !self.inner.core.registry().is_empty()
    }

    /// Returns the failure-classification statistics.
    #[must_use]
    pub fn statistics(&self) -> &FailureStatistics {
        &self.inner.statistics
    }

    /// Returns the index of the last terminal success, or -1 if none yet.
    #[must_use]
    pub fn last_good_index(&self) -> i64 {
        self.inner.last_good_index.load(Ordering::Relaxed)
    }
}

impl Inner {
    /// Applies the failover decision rule and records matching failures.
    ///
    /// A failure fails over when the declared class list is empty, or when
    /// its class matches a declared class by type or supertype. Matching
    /// failures are recorded in the statistics before any retry proceeds.
    fn should_failover(&self, attempt: &Exchange) -> bool {
        let Some(error) = attempt.error() else {
            return false;
        };
        let matched = self.exceptions.is_empty()
            || self
                .exceptions
                .iter()
                .any(|declared| error.class().is_a(*declared));
        if matched {
            self.statistics.on_handled_failure(error);
        }
        matched
    }

    /// Picks the starting candidate index for a new invocation.
    fn initial_index(&self, len: usize) -> usize {
        if self.sticky {
            let last = self.last_good_index.load(Ordering::Relaxed);
            if last >= 0 && (last as usize) < len {
                return last as usize;
            }
            0
        } else if self.round_robin {
            let len = len as i64;
            let advance = |previous: i64| {
                if previous + 1 >= len {
                    0
                } else {
                    previous + 1
                }
            };
            let previous = self
                .cursor
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |x| Some(advance(x)))
                .unwrap_or(-1);
            advance(previous) as usize
        } else {
            0
        }
    }
}

/// Per-invocation retry state.
///
/// Created per top-level invocation and discarded once a terminal outcome
/// is reached. The run moves by value through every scheduled step, so at
/// most one thread drives an invocation at a time even though different
/// attempts may execute on different workers.
struct FailoverRun {
    inner: Arc<Inner>,
    processors: ProcessorSnapshot,
    index: usize,
    attempts: i64,
    original: Exchange,
    /// Outcome of the most recent attempt; `None` before the first
    /// dispatch.
    copy: Option<Exchange>,
    done: Option<DoneCallback>,
}

impl FailoverRun {
    /// Evaluates the previous attempt's outcome and decides the next step.
    fn run(self: Box<Self>) {
        match self.copy.as_ref() {
            None => self.dispatch(),
            Some(attempt) => {
                if self.inner.should_failover(attempt) {
                    self.retry();
                } else {
                    self.complete(true);
                }
            },
        }
    }

    /// Dispatches the current candidate with a fresh copy of the original
    /// exchange.
    fn dispatch(self: Box<Self>) {
        if !self.inner.core.state().is_run_allowed() {
            return self.complete(false);
        }
        let processor = Arc::clone(&self.processors[self.index]);
        let attempt = self.original.attempt_copy();
        self.inner.dispatches.fetch_add(1, Ordering::Relaxed);
        debug!(
            index = self.index,
            attempts = self.attempts,
            exchange = self.original.id(),
            "dispatching attempt"
        );
        let scheduler = Arc::clone(&self.inner.scheduler);
        processor.process(
            attempt,
            Box::new(move |attempt, _sync| {
                let mut run = self;
                run.copy = Some(attempt);
                scheduler.schedule(Box::new(move || run.run()));
            }),
        );
    }

    /// Advances to the next candidate, or terminates when attempts or
    /// candidates are exhausted.
    fn retry(mut self: Box<Self>) {
        self.inner.failovers.fetch_add(1, Ordering::Relaxed);
        self.attempts += 1;
        let max = self.inner.maximum_failover_attempts;
        if max >= 0 && self.attempts > max {
            warn!(
                attempts = self.attempts,
                exchange = self.original.id(),
                "maximum failover attempts exhausted"
            );
            return self.complete(false);
        }
        self.index += 1;
        if self.index >= self.processors.len() {
            if self.inner.round_robin {
                self.index = 0;
                self.inner.cursor.store(-1, Ordering::Release);
            } else {
                warn!(
                    exchange = self.original.id(),
                    "no more processors to fail over to"
                );
                return self.complete(false);
            }
        }
        let scheduler = Arc::clone(&self.inner.scheduler);
        scheduler.schedule(Box::new(move || self.dispatch()));
    }

    /// Terminal state: merge the last attempt onto the original exchange
    /// and hand control back to the caller.
    fn complete(mut self: Box<Self>, via_success_branch: bool) {
        if via_success_branch {
            self.inner
                .last_good_index
                .store(self.index as i64, Ordering::Relaxed);
        }
        if let Some(attempt) = self.copy.take() {
            Exchange::copy_results(&mut self.original, attempt);
        }
        if !self.inner.core.state().is_run_allowed() && !self.original.is_failed() {
            self.original.set_error(ProcessingError::new(
                ErrorClass::Rejected,
                BalancerError::NotRunning.to_string(),
            ));
        }
        if let Some(done) = self.done.take() {
            done(self.original, false);
        }
    }
}

impl Processor for FailoverBalancer {
    fn process(&self, mut exchange: Exchange, done: DoneCallback) -> bool {
        let inner = Arc::clone(&self.inner);
        if !inner.core.state().is_run_allowed() {
            exchange.set_error(ProcessingError::new(
                ErrorClass::Rejected,
                BalancerError::NotRunning.to_string(),
            ));
            done(exchange, true);
            return true;
        }
        let processors = inner.core.registry().snapshot();
        if processors.is_empty() {
            exchange.set_error(ProcessingError::new(
                ErrorClass::Failure,
                BalancerError::NoProcessorsAvailable(inner.core.name().to_string()).to_string(),
            ));
            done(exchange, true);
            return true;
        }
        let index = inner.initial_index(processors.len());
        let run = Box::new(FailoverRun {
            inner,
            processors,
            index,
            attempts: 0,
            original: exchange,
            copy: None,
            done: Some(done),
        });
        run.run();
        false
    }
}

impl Service for FailoverBalancer {
    fn init(&self) -> ServiceResult<()> {
        self.inner.core.init_cascade()
    }

    fn start(&self) -> ServiceResult<()> {
        self.inner.core.start_cascade()
    }

    fn stop(&self) -> ServiceResult<()> {
        self.inner.core.stop_cascade()
    }

    fn shutdown(&self) -> ServiceResult<()> {
        self.inner.core.shutdown_cascade()
    }

    fn status(&self) -> ServiceStatus {
        self.inner.core.state().status()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut metrics = MetricsPayload::new();
        metrics.counter("dispatches", self.inner.dispatches.load(Ordering::Relaxed));
        metrics.counter("failovers", self.inner.failovers.load(Ordering::Relaxed));
        for class in self.inner.statistics.declared_classes() {
            metrics.counter(
                format!("failures_{}", class.name()),
                self.inner.statistics.failure_counter(class),
            );
        }
        metrics.counter(
            "failures_fallback",
            self.inner.statistics.fallback_counter(),
        );
        metrics.gauge("processors", self.inner.core.registry().len() as f64);
        metrics
    }
}

impl std::fmt::Debug for FailoverBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverBalancer")
            .field("round_robin", &self.inner.round_robin)
            .field("sticky", &self.inner.sticky)
            .field(
                "maximum_failover_attempts",
                &self.inner.maximum_failover_attempts,
            )
            .field("processors", &self.inner.core.registry().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;
    use std::sync::Mutex;

    /// Processor that fails a configured number of times before
    /// succeeding, completing synchronously inline.
    struct Scripted {
        class: ErrorClass,
        failures_remaining: AtomicI64,
        calls: AtomicU64,
        reply: &'static str,
    }

    impl Scripted {
        fn failing_n(class: ErrorClass, n: i64, reply: &'static str) -> Arc<dyn Processor> {
            Arc::new(Self {
                class,
                failures_remaining: AtomicI64::new(n),
                calls: AtomicU64::new(0),
                reply,
            })
        }

        fn always_failing(class: ErrorClass) -> Arc<dyn Processor> {
            Self::failing_n(class, i64::MAX, "")
        }

        fn succeeding(reply: &'static str) -> Arc<dyn Processor> {
            Self::failing_n(ErrorClass::Failure, 0, reply)
        }
    }

    impl Service for Scripted {}

    impl Processor for Scripted {
        fn process(&self, mut exchange: Exchange, done: DoneCallback) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let remaining = self.failures_remaining.load(Ordering::Relaxed);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
                exchange.set_error(ProcessingError::new(self.class, "scripted failure"));
            } else {
                exchange.set_body(self.reply);
            }
            done(exchange, true);
            true
        }
    }

    struct Harness {
        balancer: FailoverBalancer,
        scheduler: Arc<ManualScheduler>,
    }

    impl Harness {
        fn new(config: FailoverConfig, processors: Vec<Arc<dyn Processor>>) -> Self {
            let scheduler = Arc::new(ManualScheduler::new());
            let balancer =
                FailoverBalancer::new(Arc::clone(&scheduler) as Arc<dyn Scheduler>, config)
                    .unwrap();
            for processor in processors {
                balancer.add_processor(processor);
            }
            balancer.start().unwrap();
            Self {
                balancer,
                scheduler,
            }
        }

        /// Submits the exchange and pumps the scheduler to completion.
        fn send(&self, exchange: Exchange) -> Exchange {
            let result = Arc::new(Mutex::new(None));
            let slot = Arc::clone(&result);
            self.balancer.process(
                exchange,
                Box::new(move |exchange, _| {
                    *slot.lock().unwrap() = Some(exchange);
                }),
            );
            self.scheduler.run_until_idle();
            let outcome = result.lock().unwrap().take();
            outcome.expect("completion callback not invoked")
        }
    }

    #[test]
    fn test_failover_to_next_processor() {
        let harness = Harness::new(
            FailoverConfig::default(),
            vec![
                Scripted::always_failing(ErrorClass::Io),
                Scripted::succeeding("from-1"),
            ],
        );

        let outcome = harness.send(Exchange::with_body("req"));
        assert!(!outcome.is_failed());
        assert_eq!(outcome.body().unwrap().as_ref(), b"from-1");
        assert_eq!(harness.balancer.last_good_index(), 1);

        // Repeated invocations keep converging on index 1.
        let outcome = harness.send(Exchange::with_body("req"));
        assert!(!outcome.is_failed());
        assert_eq!(harness.balancer.last_good_index(), 1);
    }

    #[test]
    fn test_exhausted_attempts_carry_last_failure() {
        let harness = Harness::new(
            FailoverConfig {
                maximum_failover_attempts: 0,
                ..FailoverConfig::default()
            },
            vec![
                Scripted::always_failing(ErrorClass::Io),
                Scripted::succeeding("unreached"),
            ],
        );

        let outcome = harness.send(Exchange::with_body("req"));
        assert_eq!(outcome.error().unwrap().class(), ErrorClass::Io);
        // No terminal success happened, so the sticky index stays unset.
        assert_eq!(harness.balancer.last_good_index(), -1);
    }

    #[test]
    fn test_undeclared_error_is_not_retried() {
        // Processor 0 fails with a declared class, processor 1 with an
        // undeclared one: the second failure is terminal and never reaches
        // the statistics.
        let harness = Harness::new(
            FailoverConfig {
                exceptions: vec![ErrorClass::Io],
                maximum_failover_attempts: 1,
                ..FailoverConfig::default()
            },
            vec![
                Scripted::always_failing(ErrorClass::Io),
                Scripted::always_failing(ErrorClass::Application),
                Scripted::succeeding("unreached"),
            ],
        );

        let outcome = harness.send(Exchange::with_body("req"));
        assert_eq!(outcome.error().unwrap().class(), ErrorClass::Application);

        let stats = harness.balancer.statistics();
        assert_eq!(stats.failure_counter(ErrorClass::Io), 1);
        assert_eq!(stats.fallback_counter(), 0);
    }

    #[test]
    fn test_declared_superclass_matches_subclass() {
        // Timeout is an Io subclass, so a Timeout failure fails over when
        // Io is declared.
        let harness = Harness::new(
            FailoverConfig {
                exceptions: vec![ErrorClass::Io],
                ..FailoverConfig::default()
            },
            vec![
                Scripted::always_failing(ErrorClass::Timeout),
                Scripted::succeeding("ok"),
            ],
        );

        let outcome = harness.send(Exchange::with_body("req"));
        assert!(!outcome.is_failed());
        // The statistic buckets by exact class: Timeout was undeclared.
        assert_eq!(harness.balancer.statistics().fallback_counter(), 1);
    }

    #[test]
    fn test_exhausts_candidates_without_round_robin() {
        let first = Scripted::always_failing(ErrorClass::Io);
        let second = Scripted::always_failing(ErrorClass::Io);
        let harness = Harness::new(
            FailoverConfig::default(),
            vec![Arc::clone(&first), Arc::clone(&second)],
        );

        let outcome = harness.send(Exchange::with_body("req"));
        assert_eq!(outcome.error().unwrap().class(), ErrorClass::Io);
        // Both candidates were attempted exactly once, no wrap-around. No
        // classes were declared, so both failures land in the fallback
        // bucket.
        assert_eq!(harness.balancer.statistics().fallback_counter(), 2);
    }

    #[test]
    fn test_round_robin_wraps_and_spreads_invocations() {
        let a = Scripted::succeeding("a");
        let b = Scripted::succeeding("b");
        let harness = Harness::new(
            FailoverConfig {
                round_robin: true,
                ..FailoverConfig::default()
            },
            vec![a, b],
        );

        // Successive invocations advance the shared cursor: 0, 1, 0, 1.
        let replies: Vec<Vec<u8>> = (0..4)
            .map(|_| harness.send(Exchange::with_body("req")).body().unwrap().to_vec())
            .collect();
        assert_eq!(replies, vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_round_robin_wraps_past_end_when_retrying() {
        // Index 1 fails; round-robin failover wraps to index 0.
        let a = Scripted::succeeding("a");
        let b = Scripted::always_failing(ErrorClass::Io);
        let harness = Harness::new(
            FailoverConfig {
                round_robin: true,
                ..FailoverConfig::default()
            },
            vec![a, b],
        );

        // First invocation lands on 0 and succeeds; second starts at 1,
        // fails, wraps to 0.
        assert_eq!(harness.send(Exchange::with_body("r")).body().unwrap().as_ref(), b"a");
        let outcome = harness.send(Exchange::with_body("r"));
        assert!(!outcome.is_failed());
        assert_eq!(outcome.body().unwrap().as_ref(), b"a");
    }

    #[test]
    fn test_sticky_resumes_from_last_good_index() {
        let flaky = Scripted::failing_n(ErrorClass::Io, 1, "recovered");
        let steady = Scripted::succeeding("steady");
        let harness = Harness::new(
            FailoverConfig {
                sticky: true,
                ..FailoverConfig::default()
            },
            vec![flaky, steady],
        );

        // First invocation fails over 0 -> 1; the good index is pinned.
        assert_eq!(
            harness.send(Exchange::with_body("r")).body().unwrap().as_ref(),
            b"steady"
        );
        assert_eq!(harness.balancer.last_good_index(), 1);

        // Next invocation starts straight at index 1.
        assert_eq!(
            harness.send(Exchange::with_body("r")).body().unwrap().as_ref(),
            b"steady"
        );
    }

    #[test]
    fn test_empty_registry_fails_exchange() {
        let harness = Harness::new(FailoverConfig::default(), Vec::new());
        let outcome = harness.send(Exchange::with_body("req"));
        assert_eq!(outcome.error().unwrap().class(), ErrorClass::Failure);
    }

    #[test]
    fn test_rejected_when_stopped() {
        let harness = Harness::new(
            FailoverConfig::default(),
            vec![Scripted::succeeding("unreached")],
        );
        harness.balancer.stop().unwrap();

        let outcome = harness.send(Exchange::with_body("req"));
        assert_eq!(outcome.error().unwrap().class(), ErrorClass::Rejected);
    }

    #[test]
    fn test_original_state_restored_between_attempts() {
        /// Processor that corrupts the body before failing.
        struct Corrupting;

        impl Service for Corrupting {}

        impl Processor for Corrupting {
            fn process(&self, mut exchange: Exchange, done: DoneCallback) -> bool {
                exchange.set_body("corrupted");
                exchange.set_error(ProcessingError::new(ErrorClass::Io, "after corrupting"));
                done(exchange, true);
                true
            }
        }

        /// Processor that echoes the body it received.
        struct Echo;

        impl Service for Echo {}

        impl Processor for Echo {
            fn process(&self, mut exchange: Exchange, done: DoneCallback) -> bool {
                let body = exchange.body().cloned().unwrap_or_default();
                let echoed = format!("echo:{}", String::from_utf8_lossy(&body));
                exchange.set_body(echoed);
                done(exchange, true);
                true
            }
        }

        let harness = Harness::new(
            FailoverConfig::default(),
            vec![Arc::new(Corrupting), Arc::new(Echo)],
        );

        // The second attempt sees the original body, not the corrupted one.
        let outcome = harness.send(Exchange::with_body("original"));
        assert_eq!(outcome.body().unwrap().as_ref(), b"echo:original");
        assert!(!outcome.is_failed());
    }

    #[test]
    fn test_metrics_report_counters() {
        let harness = Harness::new(
            FailoverConfig {
                exceptions: vec![ErrorClass::Io],
                ..FailoverConfig::default()
            },
            vec![
                Scripted::always_failing(ErrorClass::Io),
                Scripted::succeeding("ok"),
            ],
        );
        harness.send(Exchange::with_body("req"));

        let metrics = harness.balancer.metrics();
        assert_eq!(metrics.counters.get("dispatches"), Some(&2));
        assert_eq!(metrics.counters.get("failovers"), Some(&1));
        assert_eq!(metrics.counters.get("failures_io"), Some(&1));
        assert_eq!(metrics.gauges.get("processors"), Some(&2.0));
    }

    #[tokio::test]
    async fn test_completes_over_tokio_scheduler() {
        use crate::runtime::TokioScheduler;

        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
        let balancer = FailoverBalancer::new(scheduler, FailoverConfig::default()).unwrap();
        balancer.add_processor(Scripted::always_failing(ErrorClass::Io));
        balancer.add_processor(Scripted::succeeding("async-ok"));
        balancer.start().unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        balancer.process(
            Exchange::with_body("req"),
            Box::new(move |exchange, _| {
                tx.send(exchange).ok();
            }),
        );

        let outcome = rx.await.unwrap();
        assert!(!outcome.is_failed());
        assert_eq!(outcome.body().unwrap().as_ref(), b"async-ok");
    }
}
