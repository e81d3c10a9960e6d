use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register metric descriptions once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

fn describe_all() {
    describe_counter!("pipeline_runs_total", "Aggregation runs started.");
    describe_counter!(
        "pipeline_validation_errors_total",
        "Identifiers rejected as malformed ISRCs."
    );
    describe_counter!(
        "provider_outcomes_total",
        "Provider outcomes per run, by provider and outcome."
    );
    describe_histogram!(
        "provider_fetch_ms",
        "Provider fetch latency in milliseconds."
    );
    describe_counter!(
        "ratelimit_denied_total",
        "Requests denied by the per-provider rate limiter."
    );
    describe_counter!("lead_scores_total", "Lead scores computed, by tier.");
    describe_counter!(
        "batch_requeued_total",
        "Batch items put back on the queue for another attempt."
    );
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if a global recorder is
    /// already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        // Descriptions sent before the recorder existed were dropped.
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
