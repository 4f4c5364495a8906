//! Metrics
//!
//! Device authorization metrics collection interfaces and implementations.

use std::collections::HashMap;
use std::sync::Mutex;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Device authorization metrics interface.
pub trait DeviceAuthMetrics: Send + Sync {
    /// Record a new device session.
    fn record_session_started(&self, provider: &str);

    /// Record a poll and the outcome label it produced.
    fn record_poll(&self, outcome: &str);

    /// Record a session reaching a terminal status.
    fn record_session_finished(&self, provider: &str, status: &str);

    /// Record a failed call to an upstream service.
    fn record_upstream_error(&self, upstream: &str, error_code: &str);

    /// Record a sweep pass.
    fn record_swept(&self, expired: usize, evicted: usize);

    /// Set live sessions gauge.
    fn set_live_sessions(&self, count: usize);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl DeviceAuthMetrics for NoOpMetrics {
    fn record_session_started(&self, _provider: &str) {}
    fn record_poll(&self, _outcome: &str) {}
    fn record_session_finished(&self, _provider: &str, _status: &str) {}
    fn record_upstream_error(&self, _upstream: &str, _error_code: &str) {}
    fn record_swept(&self, _expired: usize, _evicted: usize) {}
    fn set_live_sessions(&self, _count: usize) {}
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
    pub timestamp: i64,
}

/// In-memory metrics for testing.
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of all values recorded under `name`.
    pub fn total(&self, name: &str) -> f64 {
        self.get_entries_by_name(name).iter().map(|e| e.value).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        self.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn labels(pairs: &[(&str, &str)]) -> MetricLabels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl DeviceAuthMetrics for InMemoryMetrics {
    fn record_session_started(&self, provider: &str) {
        self.record(
            "device_auth_sessions_started_total",
            1.0,
            labels(&[("provider", provider)]),
        );
    }

    fn record_poll(&self, outcome: &str) {
        self.record(
            "device_auth_polls_total",
            1.0,
            labels(&[("outcome", outcome)]),
        );
    }

    fn record_session_finished(&self, provider: &str, status: &str) {
        self.record(
            "device_auth_sessions_finished_total",
            1.0,
            labels(&[("provider", provider), ("status", status)]),
        );
    }

    fn record_upstream_error(&self, upstream: &str, error_code: &str) {
        self.record(
            "device_auth_upstream_errors_total",
            1.0,
            labels(&[("upstream", upstream), ("error_code", error_code)]),
        );
    }

    fn record_swept(&self, expired: usize, evicted: usize) {
        self.record(
            "device_auth_sessions_expired_total",
            expired as f64,
            MetricLabels::new(),
        );
        self.record(
            "device_auth_sessions_evicted_total",
            evicted as f64,
            MetricLabels::new(),
        );
    }

    fn set_live_sessions(&self, count: usize) {
        self.record("device_auth_live_sessions", count as f64, MetricLabels::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_session_started("google");
        metrics.record_poll("pending");
        metrics.record_swept(1, 2);
    }

    #[test]
    fn test_in_memory_metrics() {
        let metrics = InMemoryMetrics::new();

        metrics.record_session_started("google");
        metrics.record_session_finished("google", "complete");

        assert_eq!(metrics.get_entries().len(), 2);

        let started = metrics.get_entries_by_name("device_auth_sessions_started_total");
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].labels.get("provider"), Some(&"google".to_string()));
    }

    #[test]
    fn test_swept_totals() {
        let metrics = InMemoryMetrics::new();
        metrics.record_swept(2, 1);
        metrics.record_swept(1, 3);

        assert_eq!(metrics.total("device_auth_sessions_expired_total"), 3.0);
        assert_eq!(metrics.total("device_auth_sessions_evicted_total"), 4.0);
    }
}
