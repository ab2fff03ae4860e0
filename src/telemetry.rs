// src/telemetry.rs
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogFormat;

/// Install the global subscriber. `RUST_LOG` wins; otherwise `verbose`
/// picks between debug and info for this crate.
pub fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "page_sentinel=debug,info"
    } else {
        "page_sentinel=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    let res = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sentinel_checks_total", "Targets checked.");
        describe_counter!(
            "sentinel_fetch_failures_total",
            "Fetches that failed and were treated as empty observations."
        );
        describe_counter!(
            "sentinel_significant_total",
            "Checks classified as significant changes."
        );
        describe_counter!(
            "sentinel_alerts_total",
            "Per-channel alert outcomes, labelled by channel and outcome."
        );
        describe_gauge!("sentinel_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Serve Prometheus exposition on `addr`. Must run inside a Tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus exporter on {addr}: {e}"))?;
    ensure_metrics_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
