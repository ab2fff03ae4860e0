// src/notify/telegram.rs
//! Telegram Bot API channel.
//!
//! Text-only alerts go through `sendMessage`; alerts with a screenshot go
//! through `sendPhoto` as multipart with the message as caption. Screenshots
//! are shrunk to fit the Bot API photo bounds and re-encoded as PNG first.

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{truncate_chars, Alert, ChannelConfig, Notifier, NotifyError};
use crate::config::{TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
// Bot API limits, in characters.
const MAX_TEXT: usize = 4096;
const MAX_CAPTION: usize = 1024;
/// Longest photo side sent; larger screenshots are scaled down.
const MAX_PHOTO_SIDE: u32 = 1280;

/// Decode, scale down to fit `MAX_PHOTO_SIDE` (never up) and re-encode as PNG.
fn prepare_photo(raw: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let mut img = image::load_from_memory(raw)?;
    let (w, h) = img.dimensions();
    if w > MAX_PHOTO_SIDE || h > MAX_PHOTO_SIDE {
        img = img.resize(MAX_PHOTO_SIDE, MAX_PHOTO_SIDE, FilterType::Lanczos3);
        tracing::debug!(from = ?(w, h), to = ?img.dimensions(), "screenshot scaled down");
    }
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_channel(cfg: &ChannelConfig, timeout: Duration) -> Self {
        Self::new(
            cfg.credential(TELEGRAM_BOT_TOKEN).unwrap_or_default(),
            cfg.credential(TELEGRAM_CHAT_ID).unwrap_or_default(),
        )
        .with_timeout(timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point at a different Bot API host (self-hosted server, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn send_text(&self, text: &str) -> Result<reqwest::Response, NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": truncate_chars(text, MAX_TEXT),
        });
        Ok(self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?)
    }

    async fn send_photo(&self, png: Vec<u8>, caption: &str) -> Result<reqwest::Response, NotifyError> {
        let photo = Part::bytes(png)
            .file_name("screenshot.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", truncate_chars(caption, MAX_CAPTION))
            .part("photo", photo);
        Ok(self
            .client
            .post(self.method_url("sendPhoto"))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?)
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    fn channel_name(&self) -> &'static str {
        "telegram"
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &[TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID]
    }

    fn describe(&self, alert: &Alert) -> String {
        match &alert.image {
            Some(img) => format!(
                "sendPhoto to chat {} ({} bytes) caption={:?}",
                self.chat_id,
                img.len(),
                alert.message
            ),
            None => format!("sendMessage to chat {} text={:?}", self.chat_id, alert.message),
        }
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let photo = match alert.image.as_deref().map(prepare_photo) {
            Some(Ok(png)) => Some(png),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "screenshot is not a readable image, sending text only");
                None
            }
            None => None,
        };
        let with_photo = photo.is_some();
        let response = match photo {
            Some(png) => self.send_photo(png, &alert.message).await?,
            None => self.send_text(&alert.message).await?,
        };

        let status = response.status();
        let resp_body: serde_json::Value = response.json().await.unwrap_or_default();

        if status.is_success() && resp_body.get("ok") == Some(&serde_json::Value::Bool(true)) {
            tracing::debug!(chat_id = %self.chat_id, photo = with_photo, "telegram accepted");
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64())
                .unwrap_or(30);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let description = resp_body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown Telegram API error");
        Err(NotifyError::Rejected(format!("telegram {status}: {description}")))
    }
}
