//! Prometheus metrics
//!
//! Metric names are defined once here; call sites use the typed enums.

use std::time::Duration;

/// Latency histograms, recorded in milliseconds
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Quote fan-out across all sources
    Routing,
    /// One full execution attempt
    Execution,
    /// Time a job spent in PROCESSING
    JobProcessing,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Jobs waiting for a slot
    PendingJobs,
    /// Jobs currently executing
    ProcessingJobs,
    /// Jobs waiting out a retry backoff
    RetryPendingJobs,
}

/// Monotonic counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    OrdersAdded,
    OrdersRejected,
    JobsCompleted,
    JobsRetried,
    JobsFailed,
    CircuitBreakerTrips,
    ExecutionsConfirmed,
    ExecutionsFailed,
    QuoteSourceFailures,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::Routing => "dexexec_routing_latency_ms",
            LatencyMetric::Execution => "dexexec_execution_latency_ms",
            LatencyMetric::JobProcessing => "dexexec_job_processing_ms",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::PendingJobs => "dexexec_jobs_pending",
            GaugeMetric::ProcessingJobs => "dexexec_jobs_processing",
            GaugeMetric::RetryPendingJobs => "dexexec_jobs_retry_pending",
        }
    }
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::OrdersAdded => "dexexec_orders_added_total",
            CounterMetric::OrdersRejected => "dexexec_orders_rejected_total",
            CounterMetric::JobsCompleted => "dexexec_jobs_completed_total",
            CounterMetric::JobsRetried => "dexexec_jobs_retried_total",
            CounterMetric::JobsFailed => "dexexec_jobs_failed_total",
            CounterMetric::CircuitBreakerTrips => "dexexec_circuit_breaker_trips_total",
            CounterMetric::ExecutionsConfirmed => "dexexec_executions_confirmed_total",
            CounterMetric::ExecutionsFailed => "dexexec_executions_failed_total",
            CounterMetric::QuoteSourceFailures => "dexexec_quote_source_failures_total",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        assert!(LatencyMetric::Routing.name().starts_with("dexexec_"));
        assert!(GaugeMetric::PendingJobs.name().starts_with("dexexec_"));
        assert!(CounterMetric::JobsFailed.name().ends_with("_total"));
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_latency(LatencyMetric::Execution, Duration::from_millis(5));
        set_gauge(GaugeMetric::ProcessingJobs, 2.0);
        increment(CounterMetric::OrdersAdded);
    }
}
