// tests/run_pipeline.rs
//
// Whole-run behavior: ordering, at-most-once cursor advance, partial
// failures, seen-id bookkeeping and state persistence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::{extract::State, routing::{get, post}, Json, Router};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use release_notifier::config::AppConfig;
use release_notifier::ingest::dates::RecencyWindow;
use release_notifier::ingest::releases::ReleaseSource;
use release_notifier::ingest::rss::RssFeedProvider;
use release_notifier::ingest::types::{FeedConfig, Release, ReleaseDetails};
use release_notifier::{Notification, Notifier, NotifierMux, Pipeline, RunOptions, RunState};
use serde_json::{json, Value};

const RSS_XML: &str = include_str!("fixtures/rss_feed.xml");
const RELEASES_JSON: &str = include_str!("fixtures/releases.json");

struct Releases(Vec<Release>);

#[async_trait::async_trait]
impl ReleaseSource for Releases {
    async fn fetch_releases(&self) -> Result<Vec<Release>> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait::async_trait]
impl ReleaseSource for BrokenSource {
    async fn fetch_releases(&self) -> Result<Vec<Release>> {
        Err(anyhow!("connection refused"))
    }
}

/// Records every notification; fails the `fail_on`-th call (1-based).
#[derive(Clone, Default)]
struct RecordingSink {
    seen: Arc<Mutex<Vec<Notification>>>,
    fail_on: Option<usize>,
}

#[async_trait::async_trait]
impl Notifier for RecordingSink {
    async fn send(
        &self,
        note: &Notification,
        _state: &mut RunState,
        _today: NaiveDate,
    ) -> Result<()> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(note.clone());
        if Some(seen.len()) == self.fail_on {
            return Err(anyhow!("rate limited"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn release(id: u64, date: &str) -> Release {
    Release {
        id,
        release_details: Some(ReleaseDetails {
            release_summary: Some(format!("summary {id}")),
            release_number: Some(format!("1.{id}")),
            ..Default::default()
        }),
        release_date: Some(date.to_string()),
        ..Default::default()
    }
}

fn feed() -> FeedConfig {
    FeedConfig {
        id: "vendor-blog".into(),
        name: "Vendor Blog".into(),
        vendor: "Vendor".into(),
        url: "https://blog.example.com/rss".into(),
        enabled: true,
    }
}

fn opts() -> RunOptions {
    RunOptions {
        send_pause: Duration::ZERO,
        ..RunOptions::default()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn failed_send_still_advances_cursor() {
    let sink = RecordingSink {
        fail_on: Some(2),
        ..Default::default()
    };
    let pipeline = Pipeline::new(NotifierMux::new(vec![Box::new(sink.clone())]), opts())
        .with_release_source(Box::new(Releases(vec![
            release(3, "2024-01-03"),
            release(1, "2024-01-01"),
            release(2, "2024-01-02"),
        ])));

    let mut state = RunState::default();
    let summary = pipeline.run_once(&mut state, now()).await;

    assert_eq!(summary.new_items, 3);
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.sink_failures.get("recording"), Some(&1));
    assert_eq!(state.last_seen_id(), 3);

    let ids: Vec<String> = sink.seen.lock().unwrap().iter().map(|n| n.item.id.clone()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);

    // nothing is retried on the next run
    let again = pipeline.run_once(&mut state, now()).await;
    assert_eq!(again.fetched, 3);
    assert_eq!(again.new_items, 0);
    assert_eq!(sink.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn broken_source_does_not_stop_other_feeds() {
    let sink = RecordingSink::default();
    let pipeline = Pipeline::new(NotifierMux::new(vec![Box::new(sink.clone())]), opts())
        .with_release_source(Box::new(BrokenSource))
        .with_feed(Box::new(RssFeedProvider::from_fixture_str(feed(), RSS_XML)));

    let mut state = RunState::default();
    state.advance_last_seen_id(41);
    let summary = pipeline.run_once(&mut state, now()).await;

    assert_eq!(summary.source_errors, 1);
    assert_eq!(summary.new_items, 3);
    assert_eq!(summary.sent, 3);
    assert_eq!(state.last_seen_id(), 41);
}

#[tokio::test]
async fn seen_rss_ids_are_not_sent_twice() {
    let sink = RecordingSink::default();
    let pipeline = Pipeline::new(NotifierMux::new(vec![Box::new(sink.clone())]), opts())
        .with_feed(Box::new(RssFeedProvider::from_fixture_str(feed(), RSS_XML)));

    let mut state = RunState::default();
    assert_eq!(pipeline.run_once(&mut state, now()).await.new_items, 3);
    assert_eq!(state.seen_ids("vendor-blog").len(), 3);

    assert_eq!(pipeline.run_once(&mut state, now()).await.new_items, 0);
    assert_eq!(sink.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn recency_window_drops_old_and_undated_items() {
    let sink = RecordingSink::default();
    let pipeline = Pipeline::new(
        NotifierMux::new(vec![Box::new(sink.clone())]),
        RunOptions {
            recency: RecencyWindow::days(7),
            ..opts()
        },
    )
    .with_release_source(Box::new(Releases(vec![
        release(1, "2023-06-01"),
        release(2, "2024-01-02"),
    ])))
    .with_feed(Box::new(RssFeedProvider::from_fixture_str(feed(), RSS_XML)));

    let mut state = RunState::default();
    let summary = pipeline.run_once(&mut state, now()).await;

    // release 2 plus the two dated posts
    assert_eq!(summary.new_items, 3);
    assert_eq!(state.last_seen_id(), 2);
    let ids: Vec<String> = sink.seen.lock().unwrap().iter().map(|n| n.item.id.clone()).collect();
    assert!(!ids.contains(&"post-1003".to_string()));
}

#[tokio::test]
async fn untranslated_summary_passes_through() {
    let sink = RecordingSink::default();
    let pipeline = Pipeline::new(NotifierMux::new(vec![Box::new(sink.clone())]), opts())
        .with_release_source(Box::new(Releases(vec![release(9, "2024-01-02")])));

    let mut state = RunState::default();
    pipeline.run_once(&mut state, now()).await;

    let seen = sink.seen.lock().unwrap();
    assert_eq!(seen[0].summary, "summary 9");
    assert!(seen[0].relevance.is_none());
}

#[tokio::test]
async fn empty_run_is_a_no_op() {
    let mux = NotifierMux::new(vec![Box::new(RecordingSink::default())]);
    let pipeline = Pipeline::new(mux, opts());
    let mut state = RunState::default();
    let summary = pipeline.run_once(&mut state, now()).await;
    assert_eq!(summary, Default::default());
    assert_eq!(state, RunState::default());
}

// --- full process run against stub endpoints ---

async fn releases_json() -> Json<Value> {
    Json(serde_json::from_str(RELEASES_JSON).unwrap())
}

async fn rss_xml() -> &'static str {
    RSS_XML
}

async fn slack_ok(
    State(log): State<Arc<Mutex<Vec<Value>>>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    log.lock().unwrap().push(body);
    Json(json!({ "ok": true }))
}

#[tokio::test]
async fn process_run_persists_state_between_invocations() {
    let posted: Arc<Mutex<Vec<Value>>> = Arc::default();
    let app = Router::new()
        .route("/api/chat.postMessage", post(slack_ok))
        .with_state(posted.clone())
        .route("/feed.json", get(releases_json))
        .route("/rss", get(rss_xml));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let feeds_path = dir.path().join("feeds.toml");
    std::fs::write(
        &feeds_path,
        format!("[[feeds]]\nid = \"vendor-blog\"\nname = \"Vendor Blog\"\nurl = \"{base}/rss\"\n"),
    )
    .unwrap();
    let state_path = dir.path().join("state").join("notifier_state.json");

    let vars = vec![
        ("SLACK_BOT_TOKEN".to_string(), "xoxb-test".to_string()),
        ("SLACK_API_BASE".to_string(), format!("{base}/api")),
        ("RELEASE_FEED_URL".to_string(), format!("{base}/feed.json")),
        ("RSS_FEEDS_PATH".to_string(), feeds_path.display().to_string()),
        ("STATE_PATH".to_string(), state_path.display().to_string()),
        ("SEND_PAUSE_MS".to_string(), "0".to_string()),
    ];
    let cfg = AppConfig::from_lookup(move |k: &str| {
        vars.iter().find(|(name, _)| name == k).map(|(_, v)| v.clone())
    })
    .unwrap();

    let first = release_notifier::run(&cfg).await.unwrap();
    assert_eq!(first.fetched, 6);
    assert_eq!(first.new_items, 6);
    assert_eq!(first.sent, 6);
    assert_eq!(posted.lock().unwrap().len(), 6);

    let state = RunState::load(&state_path).await;
    assert_eq!(state.last_seen_id(), 7);
    assert_eq!(state.seen_ids("vendor-blog").len(), 3);

    let second = release_notifier::run(&cfg).await.unwrap();
    assert_eq!(second.new_items, 0);
    assert_eq!(posted.lock().unwrap().len(), 6);
}
