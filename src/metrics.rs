use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and expose a static gauge for the cache TTL.
    pub fn install(cache_ttl_secs: u64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_once();
        gauge!("status_cache_ttl_secs").set(cache_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
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

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_once() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("status_cycles_total", "Completed aggregation cycles.");
        describe_histogram!("status_cycle_ms", "Wall time of one aggregation cycle in milliseconds.");
        describe_counter!(
            "status_source_results_total",
            "Per-source outcomes, labelled by source and status."
        );
        describe_counter!(
            "status_source_timeouts_total",
            "Sources that hit their task timeout."
        );
        describe_counter!(
            "status_source_panics_total",
            "Source tasks that panicked or were cancelled."
        );
        describe_counter!(
            "status_fetch_errors_total",
            "Fetch failures, labelled by fetch kind."
        );
        describe_counter!("status_fetch_retries_total", "HTTP retries on transient errors.");
        describe_histogram!("status_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("status_browser_launches_total", "Browser sessions launched.");
        describe_counter!(
            "status_browser_launch_failures_total",
            "Browser sessions that could not be created."
        );
        describe_counter!("status_cache_hits_total", "Snapshot reads served from cache.");
        describe_counter!("status_cache_misses_total", "Snapshot reads that ran a cycle.");
        describe_gauge!("status_cache_ttl_secs", "Configured snapshot TTL.");
        describe_gauge!(
            "status_last_cycle_ts",
            "Unix ts of the last published snapshot."
        );
        describe_gauge!(
            "status_services_disrupted",
            "Services reported Disrupted in the last snapshot."
        );
        describe_gauge!(
            "status_services_unknown",
            "Services reported Unknown in the last snapshot."
        );
    });
}
