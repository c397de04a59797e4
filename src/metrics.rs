use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const REQUESTS_TOTAL: &str = "screencurl_requests_total";
pub const BACKEND_DURATION: &str = "screencurl_backend_duration_seconds";

/// Installs the global Prometheus recorder and returns the handle `/metrics` renders.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(REQUESTS_TOTAL, "Screenshot requests by outcome");
    describe_histogram!(BACKEND_DURATION, "Time spent waiting for the rendering backend");

    Ok(handle)
}

pub fn record_request(outcome: &'static str) {
    counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_backend_call(duration: Duration) {
    histogram!(BACKEND_DURATION).record(duration.as_secs_f64());
}
