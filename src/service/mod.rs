//! # Service Contract
//!
//! This module defines the lifecycle contract that balancers and processors
//! implement. The contract provides a standardized interface for cascading
//! lifecycle management, status and metrics reporting.

mod contract;
mod error;
mod status;

pub use contract::{MetricsPayload, Service};
pub use error::{ServiceError, ServiceResult};
pub use status::{ServiceState, ServiceStatus};
