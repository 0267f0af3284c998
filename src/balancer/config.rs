//! Balancer configuration types.

use super::error::{BalancerError, BalancerResult};
use crate::exchange::ErrorClass;
use serde::{Deserialize, Serialize};

/// Configuration for a balancer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Selection policy.
    pub policy: PolicyType,

    /// Failover settings (used when `policy` is `failover`).
    pub failover: FailoverConfig,

    /// Sticky settings (used when `policy` is `sticky`).
    pub sticky: StickyConfig,

    /// Weighted round-robin settings (used when `policy` is
    /// `weighted-round-robin`).
    pub weighted: WeightedConfig,
}

impl BalancerConfig {
    /// Parses and validates a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`BalancerError::Config`] on malformed TOML, unknown error
    /// class names, or violated cross-field constraints.
    pub fn from_toml(s: &str) -> BalancerResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| BalancerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`BalancerError::Config`] when a constraint is violated.
    pub fn validate(&self) -> BalancerResult<()> {
        self.failover.validate()?;
        if self.policy == PolicyType::WeightedRoundRobin {
            self.weighted.validate()?;
        }
        Ok(())
    }
}

/// Selection policy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyType {
    /// Round-robin distribution.
    #[default]
    RoundRobin,
    /// Uniform random selection.
    Random,
    /// Correlation-key affinity.
    Sticky,
    /// Weighted round-robin distribution.
    WeightedRoundRobin,
    /// Exception-triggered failover.
    Failover,
}

/// Failover balancer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Error classes that trigger failover. Empty means any failure does.
    ///
    /// Unknown class names fail at deserialization time; the filter is
    /// validated when the balancer is constructed, never at dispatch time.
    pub exceptions: Vec<ErrorClass>,

    /// Advance a shared round-robin counter between invocations and wrap
    /// past the end of the processor list when retrying.
    pub round_robin: bool,

    /// Resume from the last known-good processor index.
    pub sticky: bool,

    /// Maximum failover attempts per invocation. `-1` means unbounded;
    /// `0` means fail immediately on the first retriable failure.
    pub maximum_failover_attempts: i64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            exceptions: Vec::new(),
            round_robin: false,
            sticky: false,
            maximum_failover_attempts: -1,
        }
    }
}

impl FailoverConfig {
    /// Validates the failover settings.
    ///
    /// # Errors
    ///
    /// Returns [`BalancerError::Config`] if the attempt bound is below `-1`.
    pub fn validate(&self) -> BalancerResult<()> {
        if self.maximum_failover_attempts < -1 {
            return Err(BalancerError::Config(format!(
                "maximum_failover_attempts must be >= -1, got {}",
                self.maximum_failover_attempts
            )));
        }
        Ok(())
    }
}

/// Sticky policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StickyConfig {
    /// Header carrying the correlation key.
    pub header: Option<String>,

    /// Number of hash buckets the correlation key is reduced to.
    /// `0` disables bucketing and uses the raw hash.
    pub number_of_hash_groups: u64,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            header: None,
            number_of_hash_groups: default_hash_groups(),
        }
    }
}

/// Weighted round-robin settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedConfig {
    /// One weight per processor, in registration order.
    pub weights: Vec<u32>,
}

impl WeightedConfig {
    /// Validates the weight list.
    ///
    /// # Errors
    ///
    /// Returns [`BalancerError::Config`] if the list is empty or any weight
    /// is zero.
    pub fn validate(&self) -> BalancerResult<()> {
        if self.weights.is_empty() {
            return Err(BalancerError::Config(
                "weighted round-robin requires at least one weight".to_string(),
            ));
        }
        if self.weights.contains(&0) {
            return Err(BalancerError::Config(
                "weights must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_hash_groups() -> u64 {
    65_536
}
