//! Sends one sample alert through every configured channel and prints the
//! per-channel outcome. Honors TEST_MODE and the per-channel overrides, so it
//! doubles as a credentials check.

use page_sentinel::config::Config;
use page_sentinel::notify::{Alert, Dispatcher};
use page_sentinel::telemetry::init_tracing;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let (verbose, log_format) = Config::logging_from_env();
    init_tracing(verbose, log_format);
    let cfg = Config::from_env();

    let dispatcher = Dispatcher::from_config(&cfg);
    let alert = Alert::text("🔔 Test alert from page-sentinel notify_demo");

    for result in dispatcher.notify(&alert).await {
        println!(
            "{:<9} {:<20} {}ms",
            result.channel,
            result.outcome.label(),
            result.duration_ms
        );
    }

    println!("notify-demo done");
}
