//! Policy-driven balancer.

use super::config::{BalancerConfig, PolicyType, StickyConfig};
use super::error::{BalancerError, BalancerResult};
use super::policy::{
    Policy, RandomPolicy, RoundRobinPolicy, StickyPolicy, WeightedRoundRobinPolicy,
};
use super::registry::{BalancerCore, ProcessorSnapshot};
use crate::exchange::{DoneCallback, Exchange, ErrorClass, HeaderExpression, ProcessingError};
use crate::runtime::Processor;
use crate::service::{MetricsPayload, Service, ServiceResult, ServiceStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Balancer that picks one processor per exchange and delegates to it.
///
/// The selection policy sees the current copy-on-write snapshot; an empty
/// registry fails the exchange with a no-available-processor error while
/// still invoking the completion callback.
pub struct PolicyBalancer {
    inner: Arc<Inner>,
}

struct Inner {
    core: BalancerCore,
    policy: Box<dyn Policy>,
    dispatches: AtomicU64,
    failed_selections: AtomicU64,
}

impl PolicyBalancer {
    /// Creates a balancer over the given policy.
    #[must_use]
    pub fn new(policy: Box<dyn Policy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: BalancerCore::new("policy"),
                policy,
                dispatches: AtomicU64::new(0),
                failed_selections: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a balancer from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BalancerError::Config`] for invalid settings, including a
    /// `failover` policy (which is built through
    /// [`super::FailoverBalancer`], not here).
    pub fn from_config(config: &BalancerConfig) -> BalancerResult<Self> {
        config.validate()?;
        Ok(Self::new(build_policy(config)?))
    }

    /// Appends a downstream processor.
    pub fn add_processor(&self, processor: Arc<dyn Processor>) {
        self.inner.core.registry().add(processor);
    }

    /// Removes the first entry referencing the same processor and purges
    /// any affinity state pointing at it; no-op if absent.
    pub fn remove_processor(&self, processor: &Arc<dyn Processor>) -> bool {
        let removed = self.inner.core.registry().remove(processor);
        if removed {
            self.inner.policy.on_processor_removed(processor);
        }
        removed
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

    /// Returns the policy name.
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        self.inner.policy.name()
    }
}

impl Processor for PolicyBalancer {
    fn process(&self, mut exchange: Exchange, done: DoneCallback) -> bool {
        if !self.inner.core.state().is_run_allowed() {
            exchange.set_error(ProcessingError::new(
                ErrorClass::Rejected,
                BalancerError::NotRunning.to_string(),
            ));
            done(exchange, true);
            return true;
        }
        let processors = self.inner.core.registry().snapshot();
        match self.inner.policy.choose(&processors, &exchange) {
            Some(processor) => {
                self.inner.dispatches.fetch_add(1, Ordering::Relaxed);
                debug!(
                    policy = self.inner.policy.name(),
                    exchange = exchange.id(),
                    "dispatching"
                );
                processor.process(exchange, done)
            }
            None => {
                self.inner.failed_selections.fetch_add(1, Ordering::Relaxed);
                exchange.set_error(ProcessingError::new(
                    ErrorClass::Failure,
                    BalancerError::NoProcessorsAvailable(self.inner.policy.name().to_string())
                        .to_string(),
                ));
                done(exchange, true);
                true
            }
        }
    }
}

impl Service for PolicyBalancer {
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
        metrics.counter(
            "failed_selections",
            self.inner.failed_selections.load(Ordering::Relaxed),
        );
        metrics.gauge("processors", self.inner.core.registry().len() as f64);
        metrics
    }
}

impl std::fmt::Debug for PolicyBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyBalancer")
            .field("policy", &self.inner.policy.name())
            .field("processors", &self.inner.core.registry().len())
            .finish()
    }
}

/// Builds a selection policy from configuration.
///
/// # Errors
///
/// Returns [`BalancerError::Config`] when the configured policy cannot be
/// expressed as a selection policy (`failover`) or its settings are
/// invalid.
pub fn build_policy(config: &BalancerConfig) -> BalancerResult<Box<dyn Policy>> {
    match config.policy {
        PolicyType::RoundRobin => Ok(Box::new(RoundRobinPolicy::new())),
        PolicyType::Random => Ok(Box::new(RandomPolicy::new())),
        PolicyType::Sticky => Ok(Box::new(sticky_policy(&config.sticky))),
        PolicyType::WeightedRoundRobin => {
            config.weighted.validate()?;
            Ok(Box::new(WeightedRoundRobinPolicy::new(
                config.weighted.weights.clone(),
            )))
        }
        PolicyType::Failover => Err(BalancerError::Config(
            "failover is a balancer, not a selection policy".to_string(),
        )),
    }
}

fn sticky_policy(config: &StickyConfig) -> StickyPolicy {
    let expression: Box<dyn crate::exchange::Expression> = match &config.header {
        Some(header) => Box::new(HeaderExpression::new(header.clone())),
        // Without a configured header the exchange id is the key.
        None => Box::new(|_: &Exchange| -> Option<String> { None }),
    };
    StickyPolicy::with_hash_groups(expression, config.number_of_hash_groups)
}
