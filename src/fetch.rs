// src/fetch.rs
//! Page observations and the fetch collaborator.
//!
//! [`PageFetcher`] is the seam for whatever produces `(markup, text, image)`
//! for a URL. [`HttpFetcher`] is the built-in plain-HTTP version: it has no
//! browser, so `image` is always empty and visible text is derived from the
//! markup.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::FetchConfig;
use crate::normalize::normalize;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
/// First retry delay; doubles per attempt up to `MAX_BACKOFF_SHIFT` doublings.
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_SHIFT: u32 = 6;

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT))
}

/// One check of one target. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub markup: String,
    pub visible_text: String,
    pub image: Vec<u8>,
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Observation>;
    fn name(&self) -> &'static str;
}

pub struct HttpFetcher {
    client: Client,
    retries: u32,
    per_host_delay: Duration,
    last_hit: Mutex<HashMap<String, Instant>>,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            retries: cfg.retries,
            per_host_delay: cfg.per_host_delay,
            last_hit: Mutex::new(HashMap::new()),
        })
    }

    /// Time left before `host` may be hit again; reserves the slot.
    fn reserve_slot(&self, host: &str) -> Duration {
        let now = Instant::now();
        let mut hits = match self.last_hit.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let wait = hits
            .get(host)
            .map(|last| self.per_host_delay.saturating_sub(now.duration_since(*last)))
            .unwrap_or_default();
        hits.insert(host.to_string(), now + wait);
        wait
    }

    async fn get_once(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("send request")?
            .error_for_status()
            .context("non-2xx status")?;
        resp.text().await.context("read body")
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Observation> {
        let parsed = Url::parse(url).with_context(|| format!("invalid target url {url}"))?;

        if let Some(host) = parsed.host_str() {
            let wait = self.reserve_slot(host);
            if !wait.is_zero() {
                tracing::trace!(host, wait_ms = wait.as_millis() as u64, "per-host delay");
                tokio::time::sleep(wait).await;
            }
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(&parsed).await {
                Ok(markup) => {
                    let visible_text = normalize(&markup);
                    return Ok(Observation {
                        markup,
                        visible_text,
                        image: Vec::new(),
                    });
                }
                Err(e) if attempt <= self.retries => {
                    tracing::debug!(url, attempt, "fetch failed, retrying: {e:#}");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(anyhow!("fetch {url} failed after {attempt} attempt(s): {e:#}")),
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(delay_ms: u64) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            retries: 0,
            timeout: Duration::from_secs(2),
            per_host_delay: Duration::from_millis(delay_ms),
        })
        .unwrap()
    }

    #[test]
    fn first_hit_per_host_does_not_wait() {
        let f = fetcher(1_000);
        assert!(f.reserve_slot("a.example").is_zero());
        assert!(f.reserve_slot("b.example").is_zero());
        assert!(!f.reserve_slot("a.example").is_zero());
    }

    #[test]
    fn zero_delay_never_waits() {
        let f = fetcher(0);
        assert!(f.reserve_slot("a.example").is_zero());
        assert!(f.reserve_slot("a.example").is_zero());
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1_000));
        assert_eq!(backoff(3), Duration::from_millis(2_000));
        assert_eq!(backoff(7), Duration::from_millis(32_000));
        assert_eq!(backoff(50), backoff(7));
    }

    #[tokio::test]
    async fn invalid_url_is_an_error() {
        let f = fetcher(0);
        assert!(f.fetch("not a url").await.is_err());
    }
}
