// src/monitor.rs
//! Run coordinator: fetch -> normalize -> fingerprint -> classify -> alert,
//! one target at a time, then a single state write.

use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time;

use crate::classifier::{availability, Classifier, Reason, Verdict};
use crate::config::load_targets;
use crate::fetch::{Observation, PageFetcher};
use crate::fingerprint::FingerprintSet;
use crate::normalize::{collapse_whitespace, normalize};
use crate::notify::{Alert, ChannelOutcome, DispatchResult, Dispatcher};
use crate::state::{StateStore, StatusMap, TargetRecord};
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub checked: usize,
    pub first_sightings: usize,
    pub significant: usize,
    /// Targets for which the dispatcher was invoked.
    pub alerts: usize,
    /// Channel deliveries that succeeded, across all alerts.
    pub deliveries: usize,
    pub fetch_failures: usize,
}

/// Result of checking one target.
#[derive(Debug, Clone)]
pub struct Check {
    pub record: TargetRecord,
    pub verdict: Verdict,
    pub fetch_failed: bool,
    pub dispatch: Vec<DispatchResult>,
}

pub struct Monitor {
    fetcher: Box<dyn PageFetcher>,
    classifier: Classifier,
    store: StateStore,
    dispatcher: Dispatcher,
}

impl Monitor {
    pub fn new(
        fetcher: Box<dyn PageFetcher>,
        classifier: Classifier,
        store: StateStore,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            store,
            dispatcher,
        }
    }

    /// Check every target in order and rewrite the state file once.
    /// Targets no longer listed drop out of the state.
    pub async fn run_once(&self, targets: &[String]) -> RunSummary {
        ensure_metrics_described();
        tracing::info!(targets = targets.len(), dry_run = self.dispatcher.dry_run(), "monitor run starting");

        let previous = self.store.load().await;
        let mut next = StatusMap::new();
        let mut summary = RunSummary::default();

        for url in targets {
            let check = self.check_target(url, previous.get(url)).await;

            summary.checked += 1;
            if check.fetch_failed {
                summary.fetch_failures += 1;
            }
            if check.verdict.reason == Reason::FirstSighting {
                summary.first_sightings += 1;
            }
            if check.verdict.significant {
                summary.significant += 1;
            }
            if !check.dispatch.is_empty() {
                summary.alerts += 1;
                summary.deliveries += check
                    .dispatch
                    .iter()
                    .filter(|r| r.outcome == ChannelOutcome::Delivered)
                    .count();
            }

            next.insert(url.clone(), check.record);
        }

        if let Err(e) = self.store.save(&next).await {
            tracing::warn!(path = %self.store.path().display(), "status save failed: {e:#}");
        }

        gauge!("sentinel_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            checked = summary.checked,
            significant = summary.significant,
            alerts = summary.alerts,
            fetch_failures = summary.fetch_failures,
            "monitor run complete"
        );
        summary
    }

    pub async fn check_target(&self, url: &str, previous: Option<&TargetRecord>) -> Check {
        counter!("sentinel_checks_total").increment(1);

        let (obs, fetch_failed) = match self.fetcher.fetch(url).await {
            Ok(obs) => (obs, false),
            Err(e) => {
                tracing::warn!(%url, fetcher = self.fetcher.name(), "fetch failed, using empty observation: {e:#}");
                counter!("sentinel_fetch_failures_total").increment(1);
                (Observation::default(), true)
            }
        };

        let text = visible_text(&obs);
        let fingerprints = FingerprintSet::of(&obs, &text);
        let verdict = self.classifier.classify_against(previous, &fingerprints, &text);
        let in_stock = availability(&text);

        if let Some(prev) = previous {
            if prev.in_stock != in_stock {
                tracing::info!(%url, before = ?prev.in_stock, after = ?in_stock, "availability changed");
            }
        }
        tracing::info!(%url, significant = verdict.significant, reason = %verdict.reason, "checked");

        let dispatch = if verdict.significant {
            counter!("sentinel_significant_total").increment(1);
            let alert = Alert::text(alert_message(url, &verdict, in_stock)).with_image(obs.image);
            self.dispatcher.notify(&alert).await
        } else {
            Vec::new()
        };

        let record = TargetRecord::new(fingerprints, text, in_stock, Utc::now()).inherit_extra(previous);

        Check {
            record,
            verdict,
            fetch_failed,
            dispatch,
        }
    }

    /// Re-read the target list and run every `interval` until Ctrl-C.
    pub async fn run_forever(&self, targets_path: &Path, interval: Duration) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for Ctrl-C, running until killed: {e}");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(targets_path, interval, ctrl_c).await;
    }

    /// Scheduling loop behind [`Monitor::run_forever`]. `shutdown` is polled
    /// while idle and while a run is in flight; an interrupted run does not
    /// save, so the previous state file stays intact.
    pub async fn run_until<F>(&self, targets_path: &Path, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    return;
                }
            }

            let targets = match load_targets(targets_path) {
                Ok(targets) => targets,
                Err(e) => {
                    tracing::warn!("skipping run: {e:#}");
                    continue;
                }
            };

            tokio::select! {
                _ = self.run_once(&targets) => {}
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested mid-run, state not saved");
                    return;
                }
            }
        }
    }
}

/// Normalized text of the markup; falls back to the fetcher's own visible
/// text when the markup yields nothing.
fn visible_text(obs: &Observation) -> String {
    let text = normalize(&obs.markup);
    if text.is_empty() {
        collapse_whitespace(&obs.visible_text)
    } else {
        text
    }
}

pub fn alert_message(url: &str, verdict: &Verdict, in_stock: Option<bool>) -> String {
    let mut msg = format!("🔔 Change detected at:\n{url}\nReason: {}", verdict.reason);
    match in_stock {
        Some(true) => msg.push_str("\nAvailability: in stock"),
        Some(false) => msg.push_str("\nAvailability: out of stock"),
        None => {}
    }
    msg
}
