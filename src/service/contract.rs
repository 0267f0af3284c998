//! The core Service trait.
//!
//! Balancers and processors implement this trait so the surrounding runtime
//! can manage them uniformly and cascade lifecycle transitions down to
//! children.

use super::{ServiceResult, ServiceStatus};
use std::collections::HashMap;

/// Metrics payload containing service-specific metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsPayload {
    /// Counter metrics (monotonically increasing).
    pub counters: HashMap<String, u64>,

    /// Gauge metrics (can go up and down).
    pub gauges: HashMap<String, f64>,
}

impl MetricsPayload {
    /// Creates a new empty metrics payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter metric.
    pub fn counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    /// Adds a gauge metric.
    pub fn gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }
}

/// The lifecycle contract implemented by balancers and processors.
///
/// # Lifecycle
///
/// 1. `init()` - Validate configuration and prepare internal state
/// 2. `start()` - Begin accepting work
/// 3. `status()` / `metrics()` - Ongoing monitoring
/// 4. `stop()` - Stop accepting work; may be started again
/// 5. `shutdown()` - Terminal teardown; releases children
///
/// All methods take `&self`: services are shared behind `Arc` and track
/// their state with atomics, never locks, so the dispatch path can poll
/// [`Service::is_run_allowed`] without blocking.
///
/// Leaf processors that carry no lifecycle state of their own can rely on
/// the no-op defaults and only implement their processing logic.
pub trait Service: Send + Sync {
    /// Initializes the service.
    ///
    /// Called once before `start()`. Balancers cascade this to every child
    /// processor currently registered.
    ///
    /// # Errors
    ///
    /// Returns [`super::ServiceError::InitFailed`] or
    /// [`super::ServiceError::Config`] if the service cannot initialize.
    fn init(&self) -> ServiceResult<()> {
        Ok(())
    }

    /// Starts the service.
    ///
    /// After this call returns successfully the service accepts work.
    ///
    /// # Errors
    ///
    /// Returns [`super::ServiceError::StartFailed`] if the service cannot
    /// start, or [`super::ServiceError::InvalidState`] if it has already
    /// been shut down.
    fn start(&self) -> ServiceResult<()> {
        Ok(())
    }

    /// Stops the service gracefully.
    ///
    /// In-flight work observes the state change at its next suspension
    /// point and terminates with a rejection.
    ///
    /// # Errors
    ///
    /// Returns [`super::ServiceError::StopFailed`] if graceful shutdown
    /// fails.
    fn stop(&self) -> ServiceResult<()> {
        Ok(())
    }

    /// Shuts the service down terminally.
    ///
    /// Balancers additionally empty their processor registry. The default
    /// implementation delegates to `stop()`.
    ///
    /// # Errors
    ///
    /// Returns [`super::ServiceError::StopFailed`] if teardown fails.
    fn shutdown(&self) -> ServiceResult<()> {
        self.stop()
    }

    /// Returns the current lifecycle status.
    ///
    /// Stateless leaf processors report `Running` so they never veto a
    /// cascade.
    fn status(&self) -> ServiceStatus {
        ServiceStatus::Running
    }

    /// Returns `true` if the service may dispatch work right now.
    ///
    /// Polled by the failover loop before every attempt; a `false` answer
    /// causes immediate terminal rejection rather than a new attempt.
    fn is_run_allowed(&self) -> bool {
        self.status().is_run_allowed()
    }

    /// Returns the current metrics from the service.
    fn metrics(&self) -> MetricsPayload {
        MetricsPayload::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopService;

    impl Service for NoopService {}

    #[test]
    fn test_default_lifecycle() {
        let svc = NoopService;
        svc.init().unwrap();
        svc.start().unwrap();
        assert_eq!(svc.status(), ServiceStatus::Running);
        assert!(svc.is_run_allowed());
        svc.stop().unwrap();
        svc.shutdown().unwrap();
    }

    #[test]
    fn test_metrics_payload() {
        let mut metrics = MetricsPayload::new();
        metrics.counter("dispatches", 42);
        metrics.gauge("processors", 3.0);

        assert_eq!(metrics.counters.get("dispatches"), Some(&42));
        assert_eq!(metrics.gauges.get("processors"), Some(&3.0));
    }
}
