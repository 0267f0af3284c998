//! The downstream processor seam.

use crate::exchange::{DoneCallback, Exchange};
use crate::service::Service;

/// An executable step that consumes an exchange and reports completion.
///
/// `process` may complete synchronously (invoking `done` before returning)
/// or asynchronously from another thread; the return value reports which
/// happened. Implementations take ownership of the exchange and hand it
/// back through `done` exactly once.
///
/// Processors are also [`Service`]s so balancers can cascade lifecycle
/// transitions to them; stateless processors rely on the no-op defaults.
pub trait Processor: Service {
    /// Processes the exchange, reporting completion through `done`.
    ///
    /// Returns `true` if `done` was invoked synchronously within this call.
    fn process(&self, exchange: Exchange, done: DoneCallback) -> bool;
}
