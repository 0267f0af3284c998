//! # Balancer Module
//!
//! This module provides load balancing over registered processors.
//!
//! ## Features
//!
//! - **Multiple Policies**: Round-robin, random, sticky and weighted
//!   round-robin selection
//! - **Failover**: Asynchronous retry across processors on classified
//!   failures, with round-robin and sticky starting-point modes
//! - **Copy-on-Write Registry**: Lock-free snapshots on the dispatch path
//! - **Failure Statistics**: Per-class counters for declared error classes
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │  PolicyBalancer   │
//! │                   │
//! │  ┌─────────────┐  │      ┌────────────┐
//! │  │   Policy    │──┼────▶│ Processor1 │
//! │  │  (choose)   │  │      └────────────┘
//! │  └─────────────┘  │      ┌────────────┐
//! │        │          │────▶│ Processor2 │
//! │  ┌─────────────┐  │      └────────────┘
//! │  │  Registry   │  │      ┌────────────┐
//! │  │ (snapshot)  │──┼────▶│ Processor3 │
//! │  └─────────────┘  │      └────────────┘
//! └───────────────────┘
//! ```
//!
//! The [`FailoverBalancer`] sits in front of the same registry but walks
//! candidates itself, retrying on failures whose class matches its
//! declared exceptions.

pub mod balancer;
pub mod config;
pub mod error;
pub mod failover;
pub mod policy;
pub mod registry;
pub mod stats;

pub use balancer::{build_policy, PolicyBalancer};
pub use config::{BalancerConfig, FailoverConfig, PolicyType, StickyConfig, WeightedConfig};
pub use error::{BalancerError, BalancerResult};
pub use failover::FailoverBalancer;
pub use policy::{
    Policy, RandomPolicy, RoundRobinPolicy, StickyPolicy, WeightedRoundRobinPolicy,
};
pub use registry::{BalancerCore, ProcessorRegistry, ProcessorSnapshot};
pub use stats::FailureStatistics;
