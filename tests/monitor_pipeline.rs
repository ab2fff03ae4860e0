// tests/monitor_pipeline.rs
// Coordinator end to end with a scripted fetcher and a recording channel.

use page_sentinel::notify::NotifyError;
use page_sentinel::{
    Alert, ChannelConfig, Classifier, Dispatcher, Monitor, Notifier, Observation, PageFetcher,
    StateStore,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// URL -> page to serve; `None` simulates a failed fetch.
type Pages = Arc<Mutex<HashMap<String, Option<Observation>>>>;

struct ScriptedFetcher {
    pages: Pages,
}

#[async_trait::async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Observation> {
        match self.pages.lock().unwrap().get(url).cloned().flatten() {
            Some(obs) => Ok(obs),
            None => anyhow::bail!("connection reset"),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Alert>>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn channel_name(&self) -> &'static str {
        "recording"
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["TOKEN"]
    }

    fn describe(&self, alert: &Alert) -> String {
        alert.message.clone()
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

fn page(markup: &str) -> Option<Observation> {
    Some(Observation {
        markup: markup.to_string(),
        ..Observation::default()
    })
}

fn monitor(status: &Path, pages: &Pages, sent: &Arc<Mutex<Vec<Alert>>>, dry_run: bool) -> Monitor {
    let channel = ChannelConfig {
        enabled: true,
        credentials: BTreeMap::from([("TOKEN".to_string(), "x".to_string())]),
        test_mode_override: false,
    };
    Monitor::new(
        Box::new(ScriptedFetcher {
            pages: pages.clone(),
        }),
        Classifier::default(),
        StateStore::new(status),
        Dispatcher::new(dry_run).with_channel(
            channel,
            Box::new(RecordingNotifier { sent: sent.clone() }),
        ),
    )
}

const URL: &str = "https://shop.example/p/1";

#[tokio::test]
async fn baseline_then_diff_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let pages: Pages = Arc::default();
    let sent: Arc<Mutex<Vec<Alert>>> = Arc::default();
    let targets = vec![URL.to_string()];

    // 1) First sighting: baseline only.
    pages.lock().unwrap().insert(URL.into(), page("<p>Sold out</p>"));
    let s1 = monitor(&status, &pages, &sent, false).run_once(&targets).await;
    assert_eq!(s1.first_sightings, 1);
    assert_eq!(s1.alerts, 0);
    assert!(sent.lock().unwrap().is_empty());

    // 2) Fresh Monitor (process restart): keyword flip against persisted text.
    pages.lock().unwrap().insert(URL.into(), page("<p>In stock</p><button>Add to cart</button>"));
    let s2 = monitor(&status, &pages, &sent, false).run_once(&targets).await;
    assert_eq!(s2.significant, 1);
    assert_eq!(s2.deliveries, 1);
    {
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains(URL));
        assert!(sent[0].message.contains("Availability: in stock"));
        assert!(sent[0].image.is_none());
    }

    // 3) Markup churn only: quiet.
    pages.lock().unwrap().insert(
        URL.into(),
        page(r#"<div data-build="9f1"><p>In stock</p><button>Add to cart</button></div>"#),
    );
    let s3 = monitor(&status, &pages, &sent, false).run_once(&targets).await;
    assert_eq!(s3.significant, 0);
    assert_eq!(sent.lock().unwrap().len(), 1);

    let saved = StateStore::new(&status).load().await;
    assert_eq!(saved[URL].last_visible_text, "In stock Add to cart");
    assert_eq!(saved[URL].in_stock, Some(true));
}

#[tokio::test]
async fn failed_fetch_is_an_empty_observation_not_an_abort() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let pages: Pages = Arc::default();
    let sent: Arc<Mutex<Vec<Alert>>> = Arc::default();
    let other = "https://shop.example/p/2".to_string();
    let targets = vec![URL.to_string(), other.clone()];

    pages.lock().unwrap().insert(URL.into(), page("<p>In stock</p>"));
    pages.lock().unwrap().insert(other.clone(), page("<p>Coming soon</p>"));
    monitor(&status, &pages, &sent, false).run_once(&targets).await;

    pages.lock().unwrap().insert(URL.into(), None);
    pages.lock().unwrap().insert(other.clone(), page("<p>Available to ship</p>"));
    let s = monitor(&status, &pages, &sent, false).run_once(&targets).await;

    assert_eq!(s.checked, 2);
    assert_eq!(s.fetch_failures, 1);
    // Empty text after a failed fetch still flips "in stock".
    assert_eq!(s.significant, 2);

    let saved = StateStore::new(&status).load().await;
    assert_eq!(saved[URL].last_visible_text, "");
    assert_eq!(saved[&other].last_visible_text, "Available to ship");
}

#[tokio::test]
async fn dry_run_classifies_but_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let pages: Pages = Arc::default();
    let sent: Arc<Mutex<Vec<Alert>>> = Arc::default();
    let targets = vec![URL.to_string()];

    pages.lock().unwrap().insert(URL.into(), page("<p>Sold out</p>"));
    monitor(&status, &pages, &sent, true).run_once(&targets).await;
    pages.lock().unwrap().insert(URL.into(), page("<p>In stock</p>"));
    let s = monitor(&status, &pages, &sent, true).run_once(&targets).await;

    assert_eq!(s.significant, 1);
    assert_eq!(s.alerts, 1);
    assert_eq!(s.deliveries, 0);
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delisted_targets_leave_the_state() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let pages: Pages = Arc::default();
    let sent: Arc<Mutex<Vec<Alert>>> = Arc::default();
    let other = "https://shop.example/p/2".to_string();

    pages.lock().unwrap().insert(URL.into(), page("<p>a</p>"));
    pages.lock().unwrap().insert(other.clone(), page("<p>b</p>"));
    monitor(&status, &pages, &sent, false)
        .run_once(&[URL.to_string(), other.clone()])
        .await;
    monitor(&status, &pages, &sent, false)
        .run_once(&[URL.to_string()])
        .await;

    let saved = StateStore::new(&status).load().await;
    assert_eq!(saved.len(), 1);
    assert!(saved.contains_key(URL));
}

struct StallingFetcher;

#[async_trait::async_trait]
impl PageFetcher for StallingFetcher {
    async fn fetch(&self, _url: &str) -> anyhow::Result<Observation> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Observation::default())
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

#[tokio::test]
async fn shutdown_during_a_run_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let urls = dir.path().join("urls.txt");
    let status = dir.path().join("status.json");
    std::fs::write(&urls, format!("{URL}\n")).unwrap();

    let monitor = Monitor::new(
        Box::new(StallingFetcher),
        Classifier::default(),
        StateStore::new(&status),
        Dispatcher::new(true),
    );

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        // First tick fires at once, so this lands inside the stalled fetch.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(());
    });
    let shutdown = async {
        let _ = rx.await;
    };

    let finished = tokio::time::timeout(
        Duration::from_secs(5),
        monitor.run_until(&urls, Duration::from_secs(60), shutdown),
    )
    .await;
    assert!(finished.is_ok(), "loop kept running after shutdown was signalled mid-run");
    assert!(!status.exists(), "an interrupted run must not write state");
}
