//! Telemetry (tracing and metrics) bootstrap for lakesync services.

pub mod metrics;
pub mod tracing;
