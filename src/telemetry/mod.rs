//! Telemetry
//!
//! Observability components for device authorization.
//!
//! This module provides:
//!
//! - **Metrics**: Session, poll and upstream counters
//! - **Logging**: Structured logging with context

pub mod logging;
pub mod metrics;

// Metrics
pub use metrics::{DeviceAuthMetrics, InMemoryMetrics, MetricEntry, MetricLabels, NoOpMetrics};

// Logging
pub use logging::{
    fingerprint, DeviceAuthLogContext, InMemoryLogger, LogEntry, LogLevel, Logger, NoOpLogger,
    TracingLogger,
};
