// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod classifier;
pub mod config;
pub mod fetch;
pub mod fingerprint;
pub mod monitor;
pub mod normalize;
pub mod state;
pub mod telemetry;

// Alert fan-out (telegram, email, webhook)
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::classifier::{Classifier, KeywordVocabulary, Reason, Verdict};
pub use crate::config::Config;
pub use crate::fetch::{HttpFetcher, Observation, PageFetcher};
pub use crate::fingerprint::{digest, FingerprintSet, EMPTY_DIGEST};
pub use crate::monitor::{Monitor, RunSummary};
pub use crate::normalize::normalize;
pub use crate::notify::{Alert, ChannelConfig, ChannelOutcome, Dispatcher, Notifier};
pub use crate::state::{StateStore, StatusMap, TargetRecord};

/// Wire a [`Monitor`] from configuration using the built-in HTTP fetcher.
pub fn build_monitor(cfg: &Config) -> anyhow::Result<Monitor> {
    let fetcher = HttpFetcher::new(&cfg.fetch)?;
    let classifier = Classifier::new(KeywordVocabulary::new(&cfg.keywords));
    let dispatcher = Dispatcher::from_config(cfg);
    tracing::info!(
        channels = ?dispatcher.channel_names(),
        dry_run = dispatcher.dry_run(),
        keywords = classifier.vocabulary().phrases().len(),
        status_file = %cfg.status_file.display(),
        "monitor wired"
    );
    Ok(Monitor::new(
        Box::new(fetcher),
        classifier,
        StateStore::new(&cfg.status_file),
        dispatcher,
    ))
}
