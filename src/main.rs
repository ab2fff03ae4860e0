//! Page Sentinel — binary entrypoint.
//! Loads configuration, then runs a single check cycle (`--once` / RUN_ONCE)
//! or loops on CHECK_INTERVAL_MIN until Ctrl-C.

use anyhow::Result;
use page_sentinel::config::{load_targets, Config};
use page_sentinel::telemetry::{init_tracing, install_prometheus};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    // Tracing first: config parsing warns about values it cannot use.
    let (verbose, log_format) = Config::logging_from_env();
    init_tracing(verbose, log_format);
    let cfg = Config::from_env();

    if let Some(addr) = cfg.metrics_addr {
        if let Err(e) = install_prometheus(addr) {
            tracing::warn!("metrics disabled: {e:#}");
        }
    }

    let once = cfg.run_once || std::env::args().skip(1).any(|a| a == "--once");
    if cfg.test_mode {
        tracing::warn!("TEST_MODE is on: no notification will leave this process");
    }

    let monitor = page_sentinel::build_monitor(&cfg)?;

    if once {
        let targets = load_targets(&cfg.urls_file)?;
        let summary = monitor.run_once(&targets).await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    tracing::info!(
        interval_secs = cfg.check_interval.as_secs(),
        urls_file = %cfg.urls_file.display(),
        "entering monitor loop"
    );
    monitor.run_forever(&cfg.urls_file, cfg.check_interval).await;
    Ok(())
}
