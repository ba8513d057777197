//! Transport adapters.
//!
//! Transport adapters can be layered on transports.

pub mod performance_metrics;
