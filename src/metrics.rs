/// Prometheus metrics for the gateway
///
/// Request, fetch, profile registry and error metrics, exported in the
/// Prometheus text format on `/metrics`.
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for request counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// Output kind for uplift requests, operation name otherwise
    pub output: String,
    /// "success" or "error"
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    /// "allowed" or "denied"
    pub decision: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub operation: String,
    pub error_type: String,
}

/// Central metrics collector with Prometheus registry
pub struct MetricsCollector {
    registry: RwLock<Registry>,

    /// Total requests by output kind and status
    pub uplift_requests_total: Family<RequestLabels, Counter>,

    /// Request duration in seconds by operation
    pub uplift_request_duration_seconds: Family<OperationLabels, Histogram>,

    /// Remote fetch decisions made by the access gate
    pub remote_fetch_total: Family<FetchLabels, Counter>,

    /// Completed profile registry rebuilds
    pub profile_registry_rebuilds_total: Counter,

    /// Profiles in the currently published registry
    pub profile_registry_profiles: Gauge,

    /// Errors by operation and error type
    pub errors_total: Family<ErrorLabels, Counter>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let uplift_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "uplift_requests_total",
            "Total number of requests by output kind and status",
            uplift_requests_total.clone(),
        );

        let uplift_request_duration_seconds =
            Family::<OperationLabels, Histogram>::new_with_constructor(|| {
                // 5ms .. ~20s
                Histogram::new(exponential_buckets(0.005, 2.5, 10))
            });
        registry.register(
            "uplift_request_duration_seconds",
            "Request latency histogram in seconds",
            uplift_request_duration_seconds.clone(),
        );

        let remote_fetch_total = Family::<FetchLabels, Counter>::default();
        registry.register(
            "remote_fetch_total",
            "Remote fetch decisions by outcome",
            remote_fetch_total.clone(),
        );

        let profile_registry_rebuilds_total = Counter::default();
        registry.register(
            "profile_registry_rebuilds_total",
            "Total number of profile registry rebuilds",
            profile_registry_rebuilds_total.clone(),
        );

        let profile_registry_profiles = Gauge::default();
        registry.register(
            "profile_registry_profiles",
            "Number of profiles in the current registry",
            profile_registry_profiles.clone(),
        );

        let errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "errors_total",
            "Total number of errors by operation and error type",
            errors_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            uplift_requests_total,
            uplift_request_duration_seconds,
            remote_fetch_total,
            profile_registry_rebuilds_total,
            profile_registry_profiles,
            errors_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        encode(&mut buffer, &registry)?;
        Ok(buffer)
    }

    fn record_request(&self, operation: &str, output: &str, status: &str, duration: Duration) {
        self.uplift_requests_total
            .get_or_create(&RequestLabels {
                output: output.to_string(),
                status: status.to_string(),
            })
            .inc();

        self.uplift_request_duration_seconds
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
            })
            .observe(duration.as_secs_f64());
    }

    pub fn record_fetch(&self, decision: &str) {
        self.remote_fetch_total
            .get_or_create(&FetchLabels {
                decision: decision.to_string(),
            })
            .inc();
    }

    pub fn record_registry_rebuild(&self, profiles: usize) {
        self.profile_registry_rebuilds_total.inc();
        self.profile_registry_profiles.set(profiles as i64);
    }

    pub fn record_error(&self, operation: &str, error_type: &str) {
        self.errors_total
            .get_or_create(&ErrorLabels {
                operation: operation.to_string(),
                error_type: error_type.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard timing one request.
///
/// Dropping the guard without calling [`RequestMetrics::success`] or
/// [`RequestMetrics::error`] records an error.
pub struct RequestMetrics {
    operation: &'static str,
    output: String,
    start: Instant,
    completed: bool,
}

impl RequestMetrics {
    pub fn new(operation: &'static str, output: impl Into<String>) -> Self {
        Self {
            operation,
            output: output.into(),
            start: Instant::now(),
            completed: false,
        }
    }

    pub fn success(mut self) {
        self.finish("success");
    }

    pub fn error(mut self) {
        self.finish("error");
    }

    fn finish(&mut self, status: &str) {
        METRICS.record_request(self.operation, &self.output, status, self.start.elapsed());
        self.completed = true;
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        if !self.completed {
            self.finish("error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        let output = collector.encode().unwrap();

        assert!(output.contains("uplift_requests_total"));
        assert!(output.contains("uplift_request_duration_seconds"));
        assert!(output.contains("remote_fetch_total"));
        assert!(output.contains("profile_registry_rebuilds_total"));
        assert!(output.contains("profile_registry_profiles"));
        assert!(output.contains("errors_total"));
    }

    #[test]
    fn test_record_request() {
        let collector = MetricsCollector::new();
        collector.record_request("json_uplift", "turtle", "success", Duration::from_millis(20));

        let output = collector.encode().unwrap();
        assert!(output.contains("output=\"turtle\""));
        assert!(output.contains("status=\"success\""));
        assert!(output.contains("operation=\"json_uplift\""));
    }

    #[test]
    fn test_registry_and_fetch_metrics() {
        let collector = MetricsCollector::new();
        collector.record_registry_rebuild(3);
        collector.record_registry_rebuild(4);
        collector.record_fetch("denied");

        let output = collector.encode().unwrap();
        assert!(output.contains("profile_registry_rebuilds_total 2"));
        assert!(output.contains("profile_registry_profiles 4"));
        assert!(output.contains("decision=\"denied\""));
    }

    #[test]
    fn test_guard_records_on_drop() {
        {
            let _guard = RequestMetrics::new("guard_drop_test", "uplifted");
        }
        let output = METRICS.encode().unwrap();
        assert!(output.contains("guard_drop_test"));
    }
}
