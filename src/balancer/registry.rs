//! Processor registry with copy-on-write snapshots.

use crate::runtime::Processor;
use crate::service::{ServiceError, ServiceResult, ServiceState, ServiceStatus};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Stable snapshot of the processor list.
pub type ProcessorSnapshot = Arc<[Arc<dyn Processor>]>;

/// Thread-safe registry of downstream processors.
///
/// The list is an immutable shared slice replaced wholesale on every
/// mutation. Readers clone the `Arc` and iterate without further
/// synchronization; they always observe either the pre- or post-update
/// list, never a torn one. Removal preserves the relative order of the
/// remaining processors.
pub struct ProcessorRegistry {
    processors: RwLock<ProcessorSnapshot>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processors: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProcessorSnapshot {
        Arc::clone(&self.processors.read().expect("registry lock poisoned"))
    }

    /// Appends a processor.
    pub fn add(&self, processor: Arc<dyn Processor>) {
        let mut guard = self.processors.write().expect("registry lock poisoned");
        let mut next: Vec<Arc<dyn Processor>> = guard.to_vec();
        next.push(processor);
        *guard = Arc::from(next);
    }

    /// Removes the first entry referencing the same processor.
    ///
    /// Returns `true` if an entry was removed; a miss is a no-op.
    pub fn remove(&self, processor: &Arc<dyn Processor>) -> bool {
        let mut guard = self.processors.write().expect("registry lock poisoned");
        let position = guard.iter().position(|p| Arc::ptr_eq(p, processor));
        match position {
            Some(index) => {
                let mut next: Vec<Arc<dyn Processor>> = guard.to_vec();
                next.remove(index);
                *guard = Arc::from(next);
                true
            },
            None => false,
        }
    }

    /// Empties the registry, returning the final snapshot.
    pub fn clear(&self) -> ProcessorSnapshot {
        let mut guard = self.processors.write().expect("registry lock poisoned");
        std::mem::replace(&mut *guard, Arc::from(Vec::new()))
    }

    /// Returns the number of registered processors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.read().expect("registry lock poisoned").len()
    }

    /// Returns `true` if no processors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Shared base for balancers: the registry plus lifecycle state, with
/// transitions cascaded to every registered processor.
#[derive(Debug)]
pub struct BalancerCore {
    name: &'static str,
    registry: ProcessorRegistry,
    state: ServiceState,
}

impl BalancerCore {
    /// Creates a core for the named balancer.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: ProcessorRegistry::new(),
            state: ServiceState::new(),
        }
    }

    /// Returns the balancer name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the processor registry.
    #[must_use]
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Returns the lifecycle state holder.
    #[must_use]
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Initializes the balancer and every registered processor.
    pub fn init_cascade(&self) -> ServiceResult<()> {
        for processor in self.registry.snapshot().iter() {
            processor.init()?;
        }
        self.state.set(ServiceStatus::Initialized);
        info!(balancer = self.name, "initialized");
        Ok(())
    }

    /// Starts the balancer and every registered processor.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidState`] when the balancer has already
    /// been shut down; shutdown is terminal.
    pub fn start_cascade(&self) -> ServiceResult<()> {
        if self.state.status() == ServiceStatus::Shutdown {
            return Err(ServiceError::InvalidState {
                current: self.state.status().to_string(),
                expected: "new, initialized or stopped".to_string(),
            });
        }
        for processor in self.registry.snapshot().iter() {
            processor.start()?;
        }
        self.state.set(ServiceStatus::Running);
        info!(
            balancer = self.name,
            processors = self.registry.len(),
            "started"
        );
        Ok(())
    }

    /// Stops the balancer and every registered processor.
    pub fn stop_cascade(&self) -> ServiceResult<()> {
        self.state.set(ServiceStatus::Stopped);
        for processor in self.registry.snapshot().iter() {
            processor.stop()?;
        }
        info!(balancer = self.name, "stopped");
        Ok(())
    }

    /// Shuts down the balancer, every registered processor, and empties
    /// the registry.
    pub fn shutdown_cascade(&self) -> ServiceResult<()> {
        self.state.set(ServiceStatus::Shutdown);
        let children = self.registry.clear();
        for processor in children.iter() {
            processor.shutdown()?;
        }
        info!(balancer = self.name, "shut down");
        Ok(())
    }
}
