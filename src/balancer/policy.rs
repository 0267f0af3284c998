//! Selection policies.

use crate::exchange::{Exchange, Expression};
use crate::runtime::Processor;
use rand::Rng;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// A selection policy: given the current processor snapshot and the work
/// unit, pick one processor.
///
/// `choose` returns `None` only when `processors` is empty; the caller then
/// fails the exchange with a no-available-processor error and still invokes
/// the completion callback.
pub trait Policy: Send + Sync {
    /// Selects a processor from the snapshot.
    fn choose(
        &self,
        processors: &[Arc<dyn Processor>],
        exchange: &Exchange,
    ) -> Option<Arc<dyn Processor>>;

    /// Returns the policy name.
    fn name(&self) -> &'static str;

    /// Notifies the policy that a processor left the registry, so any
    /// affinity state pointing at it can be purged.
    fn on_processor_removed(&self, _processor: &Arc<dyn Processor>) {}
}

/// Uniform random selection.
#[derive(Debug, Default)]
pub struct RandomPolicy {
    /// Last chosen index, retained for introspection.
    last_index: AtomicUsize,
}

impl RandomPolicy {
    /// Creates a new random policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index chosen by the most recent selection.
    #[must_use]
    pub fn last_index(&self) -> usize {
        self.last_index.load(Ordering::Relaxed)
    }
}

impl Policy for RandomPolicy {
    fn choose(
        &self,
        processors: &[Arc<dyn Processor>],
        _exchange: &Exchange,
    ) -> Option<Arc<dyn Processor>> {
        if processors.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..processors.len());
        self.last_index.store(index, Ordering::Relaxed);
        Some(Arc::clone(&processors[index]))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Round-robin selection over a shared atomic counter.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    counter: AtomicUsize,
}

impl RoundRobinPolicy {
    /// Creates a new round-robin policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for RoundRobinPolicy {
    fn choose(
        &self,
        processors: &[Arc<dyn Processor>],
        _exchange: &Exchange,
    ) -> Option<Arc<dyn Processor>> {
        if processors.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % processors.len();
        Some(Arc::clone(&processors[index]))
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Correlation-key affinity.
///
/// A configured expression derives the correlation key from the exchange;
/// the key's hash is reduced to a bounded bucket and the chosen processor
/// is memoized per bucket. The first selection for a bucket delegates to an
/// internal round-robin chooser. Removing a processor purges every bucket
/// pointing at it, so the next selection re-resolves.
pub struct StickyPolicy {
    expression: Box<dyn Expression>,
    number_of_hash_groups: u64,
    fallback: RoundRobinPolicy,
    affinity: Mutex<HashMap<u64, Arc<dyn Processor>>>,
}

impl StickyPolicy {
    /// Creates a sticky policy with the default bucket count (65536).
    #[must_use]
    pub fn new(expression: Box<dyn Expression>) -> Self {
        Self::with_hash_groups(expression, 65_536)
    }

    /// Creates a sticky policy with the given bucket count.
    ///
    /// A bucket count of `0` disables bucketing and uses the raw hash.
    #[must_use]
    pub fn with_hash_groups(expression: Box<dyn Expression>, number_of_hash_groups: u64) -> Self {
        Self {
            expression,
            number_of_hash_groups,
            fallback: RoundRobinPolicy::new(),
            affinity: Mutex::new(HashMap::new()),
        }
    }

    /// Reduces the correlation key to its affinity bucket.
    fn bucket(&self, exchange: &Exchange) -> u64 {
        let key = self
            .expression
            .evaluate(exchange)
            .unwrap_or_else(|| exchange.id().to_string());
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish();
        if self.number_of_hash_groups == 0 {
            hash
        } else {
            hash % self.number_of_hash_groups
        }
    }
}

impl Policy for StickyPolicy {
    fn choose(
        &self,
        processors: &[Arc<dyn Processor>],
        exchange: &Exchange,
    ) -> Option<Arc<dyn Processor>> {
        if processors.is_empty() {
            return None;
        }
        let bucket = self.bucket(exchange);
        let mut affinity = self.affinity.lock().expect("affinity map poisoned");
        if let Some(pinned) = affinity.get(&bucket) {
            // A pin is only honored while the processor is still a member
            // of the current snapshot.
            if processors.iter().any(|p| Arc::ptr_eq(p, pinned)) {
                trace!(bucket, "sticky hit");
                return Some(Arc::clone(pinned));
            }
        }
        let chosen = self.fallback.choose(processors, exchange)?;
        affinity.insert(bucket, Arc::clone(&chosen));
        trace!(bucket, "sticky resolve");
        Some(chosen)
    }

    fn name(&self) -> &'static str {
        "sticky"
    }

    fn on_processor_removed(&self, processor: &Arc<dyn Processor>) {
        let mut affinity = self.affinity.lock().expect("affinity map poisoned");
        affinity.retain(|_, pinned| !Arc::ptr_eq(pinned, processor));
    }
}

impl std::fmt::Debug for StickyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickyPolicy")
            .field("number_of_hash_groups", &self.number_of_hash_groups)
            .finish()
    }
}

/// Weighted round-robin selection.
///
/// Maintains per-processor remaining quotas seeded from the configured
/// weights. A selection sticks to the current index until its quota is
/// exhausted, then advances in round-robin order skipping exhausted
/// entries; once all quotas reach zero they reset to the configured
/// weights. Over any window of `sum(weights)` consecutive selections each
/// processor is chosen exactly `weight` times.
#[derive(Debug)]
pub struct WeightedRoundRobinPolicy {
    weights: Vec<u32>,
    runtime: Mutex<WeightedState>,
}

#[derive(Debug)]
struct WeightedState {
    quotas: Vec<u32>,
    position: usize,
}

impl WeightedRoundRobinPolicy {
    /// Creates a policy from one weight per processor, in registration
    /// order. The weight list is validated by
    /// [`super::config::WeightedConfig::validate`] before construction.
    #[must_use]
    pub fn new(weights: Vec<u32>) -> Self {
        let quotas = weights.clone();
        Self {
            weights,
            runtime: Mutex::new(WeightedState {
                quotas,
                position: 0,
            }),
        }
    }

    /// Returns the configured weights.
    #[must_use]
    pub fn weights(&self) -> &[u32] {
        &self.weights
    }
}

impl Policy for WeightedRoundRobinPolicy {
    fn choose(
        &self,
        processors: &[Arc<dyn Processor>],
        _exchange: &Exchange,
    ) -> Option<Arc<dyn Processor>> {
        if processors.is_empty() || self.weights.is_empty() {
            return processors.first().cloned();
        }
        let mut state = self.runtime.lock().expect("weighted state poisoned");
        if state.quotas.iter().all(|quota| *quota == 0) {
            state.quotas.copy_from_slice(&self.weights);
            state.position = 0;
        }
        while state.quotas[state.position] == 0 {
            state.position = (state.position + 1) % state.quotas.len();
        }
        let index = state.position;
        state.quotas[index] -= 1;
        // Weights are expected to line up with the registered processors;
        // reduce modulo the snapshot so a shorter list still resolves.
        Some(Arc::clone(&processors[index % processors.len()]))
    }

    fn name(&self) -> &'static str {
        "weighted-round-robin"
    }
}
