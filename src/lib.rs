//! # Switchyard
//!
//! A failover load-balancing core: distributes units of work across a
//! dynamic pool of downstream processors with exception-triggered failover.
//!
//! ## Features
//!
//! - Round-robin, random, sticky and weighted round-robin selection
//! - Failover with bounded retries, round-robin or sticky candidate order
//! - Failure-classification statistics per declared error class
//! - Copy-on-write processor registry (readers never block or tear)
//! - Callback-driven execution over a pluggable scheduler
//!
//! ## Architecture
//!
//! Work units ([`exchange::Exchange`]) are submitted to a balancer together
//! with a completion callback. The balancer picks a downstream
//! [`runtime::Processor`] (or a sequence of candidates when failing over),
//! delegates the actual work, and decides on completion whether to return
//! control to the caller or try another processor. Continuations are always
//! rescheduled through a [`runtime::Scheduler`] so stack depth stays bounded
//! across retries.
//!
//! All components implement the [`service::Service`] trait for uniform
//! cascading lifecycle management.

pub mod balancer;
pub mod exchange;
pub mod runtime;
pub mod service;
