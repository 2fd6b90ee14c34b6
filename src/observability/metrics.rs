use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Install the Prometheus metrics recorder.
///
/// Must be called once, before any metrics are recorded. The returned
/// handle renders the text exposition format for the /metrics endpoint.
pub fn install_prometheus_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Register all metric descriptors at startup.
pub fn describe_all_metrics() {
    describe_counter!(
        "playbox_upload_total",
        "Asset uploads by outcome (ok / error)"
    );
    describe_histogram!("playbox_upload_size_bytes", "Uploaded asset size");
    describe_counter!(
        "playbox_manifest_writes_total",
        "Manifest writes by write mode"
    );
    describe_counter!(
        "playbox_manifest_conflicts_total",
        "Conditional manifest writes rejected by a version-token mismatch"
    );
}

// ---------------------------------------------------------------------------
// Recording helpers
// ---------------------------------------------------------------------------

pub fn inc_upload(outcome: &'static str) {
    counter!("playbox_upload_total", "outcome" => outcome).increment(1);
}

pub fn record_upload_size(bytes: f64) {
    histogram!("playbox_upload_size_bytes").record(bytes);
}

pub fn inc_manifest_write(mode: &'static str) {
    counter!("playbox_manifest_writes_total", "mode" => mode).increment(1);
}

pub fn inc_manifest_conflict() {
    counter!("playbox_manifest_conflicts_total").increment(1);
}
