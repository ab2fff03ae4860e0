// src/notify/webhook.rs
use reqwest::Client;
use std::time::Duration;

use super::{Alert, ChannelConfig, Notifier, NotifyError};
use crate::config::WEBHOOK_URL;

/// Generic webhook (Slack/Discord-compatible `{"text": ...}` body).
/// The screenshot is not forwarded.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_channel(cfg: &ChannelConfig, timeout: Duration) -> Self {
        Self::new(cfg.credential(WEBHOOK_URL).unwrap_or_default()).with_timeout(timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn channel_name(&self) -> &'static str {
        "webhook"
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &[WEBHOOK_URL]
    }

    fn describe(&self, alert: &Alert) -> String {
        format!("POST {} text={:?}", self.url, alert.message)
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let body = serde_json::json!({ "text": alert.message });

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Rejected(format!("webhook returned {status}: {text}")));
        }

        tracing::debug!(url = %self.url, %status, "webhook accepted");
        Ok(())
    }
}
