//! # Exchange
//!
//! The unit of work routed through a balancer: a payload, headers and
//! properties, plus an error slot that processors use to report failures.
//! There is no separate error-return channel; failures are communicated by
//! mutating the error slot and invoking the completion callback.

mod error;

pub use error::{ErrorClass, ProcessingError};

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static EXCHANGE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unit of work carrying a payload, metadata and an error slot.
///
/// Exchanges are owned values: a processor takes the exchange, mutates it,
/// and hands it back through the completion callback. The failover balancer
/// snapshots an exchange with [`Exchange::attempt_copy`] before each attempt
/// so a failed attempt never corrupts the caller's original, and merges the
/// final attempt back with [`Exchange::copy_results`].
#[derive(Debug, Clone)]
pub struct Exchange {
    id: u64,
    body: Option<Bytes>,
    headers: HashMap<String, String>,
    properties: HashMap<String, String>,
    error: Option<ProcessingError>,
}

impl Exchange {
    /// Creates a new empty exchange with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: EXCHANGE_COUNTER.fetch_add(1, Ordering::Relaxed),
            body: None,
            headers: HashMap::new(),
            properties: HashMap::new(),
            error: None,
        }
    }

    /// Creates a new exchange with the given body.
    #[must_use]
    pub fn with_body(body: impl Into<Bytes>) -> Self {
        let mut exchange = Self::new();
        exchange.body = Some(body.into());
        exchange
    }

    /// Returns the exchange identity.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Sets the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }

    /// Returns a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Sets a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Returns a property value.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Sets a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Returns the current failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ProcessingError> {
        self.error.as_ref()
    }

    /// Returns `true` if the error slot is occupied.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Records a failure in the error slot, replacing any previous one.
    pub fn set_error(&mut self, error: ProcessingError) {
        self.error = Some(error);
    }

    /// Clears and returns the current failure.
    pub fn take_error(&mut self) -> Option<ProcessingError> {
        self.error.take()
    }

    /// Creates a working copy for a failover attempt.
    ///
    /// The copy shares the identity and carries the same body, headers and
    /// properties, but the error slot is cleared so the attempt starts from
    /// the pre-failure state.
    #[must_use]
    pub fn attempt_copy(&self) -> Self {
        Self {
            id: self.id,
            body: self.body.clone(),
            headers: self.headers.clone(),
            properties: self.properties.clone(),
            error: None,
        }
    }

    /// Merges a completed attempt back onto the original exchange.
    ///
    /// Body, headers, properties and the error slot are all taken from the
    /// attempt; the target's identity is retained. Used once a terminal
    /// outcome is reached, whether success or exhausted failure.
    pub fn copy_results(target: &mut Self, source: Self) {
        target.body = source.body;
        target.headers = source.headers;
        target.properties = source.properties;
        target.error = source.error;
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion callback for asynchronous processing.
///
/// The `bool` reports whether completion happened synchronously within the
/// `process` call that received the callback.
pub type DoneCallback = Box<dyn FnOnce(Exchange, bool) + Send + 'static>;

/// Derives a correlation value from an exchange.
///
/// Used by the sticky policy to compute the affinity key. Returning `None`
/// makes the policy fall back to the exchange identity.
pub trait Expression: Send + Sync {
    /// Evaluates this expression against the exchange.
    fn evaluate(&self, exchange: &Exchange) -> Option<String>;
}

impl<F> Expression for F
where
    F: Fn(&Exchange) -> Option<String> + Send + Sync,
{
    fn evaluate(&self, exchange: &Exchange) -> Option<String> {
        self(exchange)
    }
}

/// Expression reading a named header.
#[derive(Debug, Clone)]
pub struct HeaderExpression {
    name: String,
}

impl HeaderExpression {
    /// Creates an expression over the given header name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Expression for HeaderExpression {
    fn evaluate(&self, exchange: &Exchange) -> Option<String> {
        exchange.header(&self.name).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_identity_unique() {
        let a = Exchange::new();
        let b = Exchange::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_attempt_copy_clears_error() {
        let mut original = Exchange::with_body("payload");
        original.set_header("k", "v");
        original.set_error(ProcessingError::new(ErrorClass::Io, "boom"));

        let copy = original.attempt_copy();
        assert_eq!(copy.id(), original.id());
        assert_eq!(copy.body(), original.body());
        assert_eq!(copy.header("k"), Some("v"));
        assert!(!copy.is_failed());
        // Original still carries the failure.
        assert!(original.is_failed());
    }

    #[test]
    fn test_copy_results_overwrites_target() {
        let mut original = Exchange::with_body("before");
        original.set_header("stale", "yes");
        original.set_error(ProcessingError::new(ErrorClass::Io, "first failure"));

        let mut attempt = original.attempt_copy();
        attempt.set_body("after");
        attempt.set_header("fresh", "yes");

        Exchange::copy_results(&mut original, attempt);
        assert_eq!(original.body().unwrap(), &Bytes::from("after"));
        assert_eq!(original.header("fresh"), Some("yes"));
        assert_eq!(original.header("stale"), None);
        // The successful attempt clears the pre-failure error.
        assert!(!original.is_failed());
    }

    #[test]
    fn test_header_expression() {
        let mut exchange = Exchange::new();
        exchange.set_header("session", "abc");

        let expr = HeaderExpression::new("session");
        assert_eq!(expr.evaluate(&exchange), Some("abc".to_string()));
        assert_eq!(HeaderExpression::new("missing").evaluate(&exchange), None);
    }

    #[test]
    fn test_closure_expression() {
        let expr = |exchange: &Exchange| exchange.property("tenant").map(str::to_string);
        let mut exchange = Exchange::new();
        assert_eq!(expr.evaluate(&exchange), None);
        exchange.set_property("tenant", "t1");
        assert_eq!(expr.evaluate(&exchange), Some("t1".to_string()));
    }
}
