//! Prometheus metrics for tenant-guard

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

const METRIC_UPTIME: &str = "tenant_guard_uptime_seconds";
const METRIC_INFO: &str = "tenant_guard_info";

const METRIC_AUTHENTICATIONS: &str = "tenant_guard_authentications_total";
const METRIC_KEYSET_REFRESHES: &str = "tenant_guard_keyset_refreshes_total";
const METRIC_ISSUER_RELOADS: &str = "tenant_guard_issuer_reloads_total";
const METRIC_CACHED_ISSUERS: &str = "tenant_guard_cached_issuers";

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_UPTIME, "Server uptime in seconds");
    describe_gauge!(METRIC_INFO, "Server information (always 1)");

    describe_counter!(
        METRIC_AUTHENTICATIONS,
        "Requests resolved by the authenticator chain"
    );
    describe_counter!(METRIC_KEYSET_REFRESHES, "Key set fetches by outcome");
    describe_counter!(METRIC_ISSUER_RELOADS, "Issuer list reloads by outcome");
    describe_gauge!(METRIC_CACHED_ISSUERS, "Issuers currently in the issuer cache");

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record the outcome of one authentication.
pub fn record_authentication(method: &str, outcome: &str) {
    counter!(
        METRIC_AUTHENTICATIONS,
        "method" => method.to_owned(),
        "outcome" => outcome.to_owned(),
    )
    .increment(1);
}

/// Record a key set fetch.
pub fn record_keyset_refresh(outcome: &str) {
    counter!(METRIC_KEYSET_REFRESHES, "outcome" => outcome.to_owned()).increment(1);
}

/// Record an issuer list reload and the resulting cache size.
pub fn record_issuer_reload(outcome: &str, cached: usize) {
    counter!(METRIC_ISSUER_RELOADS, "outcome" => outcome.to_owned()).increment(1);
    set_cached_issuers(cached);
}

/// Update the cached issuers gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_cached_issuers(count: usize) {
    gauge!(METRIC_CACHED_ISSUERS).set(count as f64);
}
