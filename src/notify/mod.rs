// src/notify/mod.rs
//! Alert fan-out across independently configured channels.
//!
//! Per channel, in this order:
//! 1. not enabled            -> skipped
//! 2. credentials incomplete -> skipped, logged as "missing credentials"
//! 3. dry run (global or per-channel) -> skipped, logged as "test mode"
//! 4. send                   -> delivered / failed
//!
//! A failing channel never stops the others. No retries, no fallback.

pub mod email;
pub mod telegram;
pub mod webhook;

use metrics::counter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::Config;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// What gets delivered: a human-readable message and an optional screenshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
    pub image: Option<Vec<u8>>,
}

impl Alert {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            image: None,
        }
    }

    /// Attach `image` unless it is empty.
    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = (!image.is_empty()).then_some(image);
        self
    }
}

/// Per-channel settings, read-only for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Environment-style keys (e.g. `TELEGRAM_BOT_TOKEN`) to values.
    pub credentials: BTreeMap<String, String>,
    /// Force dry run for this channel only.
    pub test_mode_override: bool,
}

impl ChannelConfig {
    /// Trimmed value of `key`, or `None` if absent or blank.
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn missing(&self, required: &[&'static str]) -> Vec<&'static str> {
        required
            .iter()
            .copied()
            .filter(|k| self.credential(k).is_none())
            .collect()
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable channel name (e.g. "telegram", "email").
    fn channel_name(&self) -> &'static str;

    /// Credential keys that must be non-blank before `send` may be called.
    fn required_credentials(&self) -> &'static [&'static str];

    /// One-line description of what `send` would do, for dry-run logs.
    fn describe(&self, alert: &Alert) -> String;

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChannelOutcome {
    NotEnabled,
    MissingCredentials { missing: Vec<&'static str> },
    DryRun,
    Delivered,
    Failed { error: String },
}

impl ChannelOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelOutcome::NotEnabled => "not_enabled",
            ChannelOutcome::MissingCredentials { .. } => "missing_credentials",
            ChannelOutcome::DryRun => "dry_run",
            ChannelOutcome::Delivered => "delivered",
            ChannelOutcome::Failed { .. } => "failed",
        }
    }

    /// Whether an external call was made.
    pub fn attempted(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered | ChannelOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub channel: &'static str,
    pub outcome: ChannelOutcome,
    pub duration_ms: u64,
}

struct Channel {
    config: ChannelConfig,
    notifier: Box<dyn Notifier>,
}

pub struct Dispatcher {
    dry_run: bool,
    channels: Vec<Channel>,
}

impl Dispatcher {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, config: ChannelConfig, notifier: Box<dyn Notifier>) -> Self {
        self.channels.push(Channel { config, notifier });
        self
    }

    /// Telegram, email and webhook, each from its own section of `cfg`.
    pub fn from_config(cfg: &Config) -> Self {
        let timeout: Duration = cfg.notify_timeout;
        Self::new(cfg.test_mode)
            .with_channel(
                cfg.telegram.clone(),
                Box::new(TelegramNotifier::from_channel(&cfg.telegram, timeout)),
            )
            .with_channel(
                cfg.email.clone(),
                Box::new(EmailNotifier::from_channel(&cfg.email, timeout)),
            )
            .with_channel(
                cfg.webhook.clone(),
                Box::new(WebhookNotifier::from_channel(&cfg.webhook, timeout)),
            )
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.notifier.channel_name()).collect()
    }

    /// Best effort: every configured channel is visited, errors are folded
    /// into the returned outcomes.
    pub async fn notify(&self, alert: &Alert) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let name = channel.notifier.channel_name();
            let start = Instant::now();
            let outcome = self.deliver(channel, alert).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            counter!("sentinel_alerts_total", "channel" => name, "outcome" => outcome.label())
                .increment(1);

            results.push(DispatchResult {
                channel: name,
                outcome,
                duration_ms,
            });
        }

        results
    }

    async fn deliver(&self, channel: &Channel, alert: &Alert) -> ChannelOutcome {
        let name = channel.notifier.channel_name();

        if !channel.config.enabled {
            tracing::trace!(channel = name, "channel not enabled");
            return ChannelOutcome::NotEnabled;
        }

        let missing = channel
            .config
            .missing(channel.notifier.required_credentials());
        if !missing.is_empty() {
            tracing::info!(
                channel = name,
                reason = "missing credentials",
                missing = ?missing,
                "channel skipped"
            );
            return ChannelOutcome::MissingCredentials { missing };
        }

        if self.dry_run || channel.config.test_mode_override {
            tracing::info!(
                channel = name,
                reason = "test mode",
                would_send = %channel.notifier.describe(alert),
                "channel skipped"
            );
            return ChannelOutcome::DryRun;
        }

        match channel.notifier.send(alert).await {
            Ok(()) => {
                tracing::info!(channel = name, "notification delivered");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(channel = name, error = %e, "notification delivery failed");
                ChannelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Cut `s` to at most `max` chars, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
