// src/config.rs
//! Environment-driven settings.
//!
//! Everything is read once at startup into a plain [`Config`] value and passed
//! down explicitly; nothing below `main` touches the process environment.
//! `Config::from_lookup` takes any key -> value function so tests can feed a map.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::notify::ChannelConfig;

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "in stock",
    "out of stock",
    "unavailable",
    "available",
    "sold out",
    "coming soon",
    "add to cart",
    "notify me",
    "back in stock",
    "only",
    "left",
    "available to ship",
];

pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const EMAIL_FROM: &str = "EMAIL_FROM";
pub const EMAIL_TO: &str = "EMAIL_TO";
pub const EMAIL_PASSWORD: &str = "EMAIL_PASSWORD";
pub const SMTP_SERVER: &str = "SMTP_SERVER";
pub const SMTP_PORT: &str = "SMTP_PORT";
pub const WEBHOOK_URL: &str = "WEBHOOK_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub timeout: Duration,
    pub per_host_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            timeout: Duration::from_secs(90),
            per_host_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub check_interval: Duration,
    pub run_once: bool,
    pub test_mode: bool,
    pub keywords: Vec<String>,
    pub urls_file: PathBuf,
    pub status_file: PathBuf,
    pub fetch: FetchConfig,
    pub notify_timeout: Duration,
    pub telegram: ChannelConfig,
    pub email: ChannelConfig,
    pub webhook: ChannelConfig,
    pub verbose: bool,
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `VERBOSE` and `LOG_FORMAT` alone, so tracing can be up before the
    /// rest of the config is parsed and its warnings have somewhere to go.
    pub fn logging_from_env() -> (bool, LogFormat) {
        log_settings(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let keywords = match lookup("KEYWORDS") {
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            _ => DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        let mut email_creds = credentials(
            &lookup,
            &[EMAIL_FROM, EMAIL_TO, EMAIL_PASSWORD, SMTP_SERVER, SMTP_PORT],
        );
        email_creds
            .entry(SMTP_SERVER.to_string())
            .or_insert_with(|| "smtp.gmail.com".to_string());

        let metrics_addr = lookup("METRICS_ADDR")
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| match s.trim().parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!(value = %s, error = %e, "ignoring unparseable METRICS_ADDR");
                    None
                }
            });

        let (verbose, log_format) = log_settings(&lookup);

        Self {
            check_interval: Duration::from_secs(60 * number(&lookup, "CHECK_INTERVAL_MIN", 5u64).max(1)),
            run_once: flag(&lookup, "RUN_ONCE", false),
            test_mode: flag(&lookup, "TEST_MODE", false),
            keywords,
            urls_file: PathBuf::from(lookup("URLS_FILE").unwrap_or_else(|| "urls.txt".into())),
            status_file: PathBuf::from(
                lookup("STATUS_FILE").unwrap_or_else(|| "status.json".into()),
            ),
            fetch: FetchConfig {
                retries: number(&lookup, "FETCH_RETRIES", 1u32),
                timeout: Duration::from_secs(number(&lookup, "FETCH_TIMEOUT_SECS", 90u64)),
                per_host_delay: Duration::from_secs(number(&lookup, "PER_HOST_MIN_DELAY_SEC", 1u64)),
            },
            notify_timeout: Duration::from_secs(number(&lookup, "NOTIFY_TIMEOUT_SECS", 10u64)),
            telegram: ChannelConfig {
                enabled: flag(&lookup, "NOTIFY_TELEGRAM", true),
                credentials: credentials(&lookup, &[TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID]),
                test_mode_override: flag(&lookup, "TELEGRAM_TEST_MODE", false),
            },
            email: ChannelConfig {
                enabled: flag(&lookup, "NOTIFY_EMAIL", false),
                credentials: email_creds,
                test_mode_override: flag(&lookup, "EMAIL_TEST_MODE", false),
            },
            webhook: ChannelConfig {
                enabled: flag(&lookup, "NOTIFY_WEBHOOK", false),
                credentials: credentials(&lookup, &[WEBHOOK_URL]),
                test_mode_override: flag(&lookup, "WEBHOOK_TEST_MODE", false),
            },
            verbose,
            log_format,
            metrics_addr,
        }
    }
}

fn log_settings<F: Fn(&str) -> Option<String>>(lookup: &F) -> (bool, LogFormat) {
    let format = match lookup("LOG_FORMAT").map(|s| s.trim().to_ascii_lowercase()) {
        Some(f) if f == "json" => LogFormat::Json,
        _ => LogFormat::Compact,
    };
    (flag(lookup, "VERBOSE", true), format)
}

fn flag<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: bool) -> bool {
    match lookup(key) {
        Some(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        None => default,
    }
}

fn number<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "unparseable number, using default");
            default
        }),
        None => default,
    }
}

fn credentials<F: Fn(&str) -> Option<String>>(lookup: &F, keys: &[&str]) -> BTreeMap<String, String> {
    keys.iter()
        .filter_map(|k| lookup(k).map(|v| (k.to_string(), v)))
        .collect()
}

/// Read the target list: one URL per line, blank lines and `#` comments skipped.
pub fn load_targets(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading targets from {}", path.display()))?;
    Ok(parse_targets(&content))
}

pub fn parse_targets(content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| seen.insert(l.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = cfg(&[]);
        assert_eq!(c.check_interval, Duration::from_secs(300));
        assert!(!c.test_mode);
        assert!(c.telegram.enabled);
        assert!(!c.email.enabled);
        assert!(!c.webhook.enabled);
        assert_eq!(c.keywords.len(), DEFAULT_KEYWORDS.len());
        assert_eq!(c.status_file, PathBuf::from("status.json"));
        assert_eq!(c.email.credential(SMTP_SERVER), Some("smtp.gmail.com"));
        assert_eq!(c.fetch.retries, 1);
        assert_eq!(c.log_format, LogFormat::Compact);
        assert!(c.metrics_addr.is_none());
    }

    #[test]
    fn flags_and_numbers_parse_leniently() {
        let c = cfg(&[
            ("TEST_MODE", "TRUE"),
            ("NOTIFY_TELEGRAM", "false"),
            ("NOTIFY_WEBHOOK", "1"),
            ("CHECK_INTERVAL_MIN", "abc"),
            ("FETCH_RETRIES", " 3 "),
        ]);
        assert!(c.test_mode);
        assert!(!c.telegram.enabled);
        assert!(c.webhook.enabled);
        assert_eq!(c.check_interval, Duration::from_secs(300));
        assert_eq!(c.fetch.retries, 3);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn bad_values_are_reported_to_the_subscriber() {
        let buf = Captured::default();
        let sink = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let c = tracing::subscriber::with_default(subscriber, || {
            cfg(&[("CHECK_INTERVAL_MIN", "5m"), ("METRICS_ADDR", "9000")])
        });
        assert_eq!(c.check_interval, Duration::from_secs(300));
        assert!(c.metrics_addr.is_none());

        let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("CHECK_INTERVAL_MIN"), "{logs}");
        assert!(logs.contains("METRICS_ADDR"), "{logs}");
    }

    #[test]
    fn log_settings_need_nothing_else() {
        let only = |k: &str| match k {
            "VERBOSE" => Some("off".to_string()),
            "LOG_FORMAT" => Some(" Json ".to_string()),
            _ => None,
        };
        assert_eq!(log_settings(&only), (false, LogFormat::Json));
        assert_eq!(log_settings(&|_: &str| None), (true, LogFormat::Compact));
    }

    #[test]
    fn keyword_override_is_split_and_trimmed() {
        let c = cfg(&[("KEYWORDS", " In Stock ,, sold out ")]);
        assert_eq!(c.keywords, vec!["In Stock".to_string(), "sold out".to_string()]);
    }

    #[test]
    fn channel_credentials_collected() {
        let c = cfg(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("WEBHOOK_URL", "https://hooks.example.com/x"),
            ("SMTP_SERVER", "mail.example.com"),
            ("EMAIL_TEST_MODE", "yes"),
        ]);
        assert_eq!(c.telegram.credential(TELEGRAM_BOT_TOKEN), Some("123:abc"));
        assert_eq!(c.telegram.credential(TELEGRAM_CHAT_ID), None);
        assert_eq!(c.webhook.credential(WEBHOOK_URL), Some("https://hooks.example.com/x"));
        assert_eq!(c.email.credential(SMTP_SERVER), Some("mail.example.com"));
        assert!(c.email.test_mode_override);
    }

    #[test]
    fn targets_skip_comments_blanks_and_duplicates() {
        let t = parse_targets("https://a.example\n\n# note\n  https://b.example  \nhttps://a.example\n");
        assert_eq!(t, vec!["https://a.example".to_string(), "https://b.example".to_string()]);
    }

    #[test]
    fn missing_targets_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_targets(&dir.path().join("nope.txt")).unwrap_err();
        assert!(format!("{err:#}").contains("reading targets"));
    }
}
