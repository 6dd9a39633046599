//! One polling run: load state, fetch, filter, enrich, send, persist.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};

use crate::config::{AppConfig, EnvironmentProfile};
use crate::enrich::{build_generator, RelevanceAnnotator, Translator};
use crate::ingest::config::{load_feeds_default, load_feeds_from};
use crate::ingest::dates::RecencyWindow;
use crate::ingest::filter::select_new;
use crate::ingest::releases::{
    release_to_item, select_new_releases, ReleaseFeedClient, ReleaseSource,
};
use crate::ingest::rss::RssFeedProvider;
use crate::ingest::types::{FeedItem, SourceProvider};
use crate::metrics::Metrics;
use crate::notify::notion::NotionNotifier;
use crate::notify::slack::SlackNotifier;
use crate::notify::{Notification, Notifier, NotifierMux};
use crate::state::RunState;

const USER_AGENT: &str = concat!("release-notifier/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub recency: RecencyWindow,
    pub max_items_per_feed: usize,
    /// Fixed delay between items, for destination rate limits.
    pub send_pause: Duration,
    pub target_lang: String,
    /// Display label for items from the release feed.
    pub release_source_name: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            recency: RecencyWindow::disabled(),
            max_items_per_feed: 10,
            send_pause: Duration::from_secs(1),
            target_lang: "KO".to_string(),
            release_source_name: "Releasebot".to_string(),
        }
    }
}

impl RunOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            recency: cfg.recency,
            max_items_per_feed: cfg.max_items_per_feed,
            send_pause: cfg.send_pause,
            target_lang: cfg.translate.target_lang.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items returned by all sources before filtering.
    pub fetched: usize,
    pub new_items: usize,
    /// Items every sink accepted.
    pub sent: usize,
    /// Items at least one sink rejected.
    pub failed: usize,
    pub source_errors: usize,
    /// Failed sends per sink name.
    pub sink_failures: BTreeMap<&'static str, usize>,
}

/// Where a queued item came from; release ids drive `last_seen_id`.
enum Origin {
    Release(u64),
    Rss,
}

pub struct Pipeline {
    releases: Option<Box<dyn ReleaseSource>>,
    feeds: Vec<Box<dyn SourceProvider>>,
    translator: Translator,
    annotator: RelevanceAnnotator,
    mux: NotifierMux,
    opts: RunOptions,
}

impl Pipeline {
    pub fn new(mux: NotifierMux, opts: RunOptions) -> Self {
        Self {
            releases: None,
            feeds: Vec::new(),
            translator: Translator::disabled(),
            annotator: RelevanceAnnotator::disabled(),
            mux,
            opts,
        }
    }

    pub fn with_release_source(mut self, src: Box<dyn ReleaseSource>) -> Self {
        self.releases = Some(src);
        self
    }

    pub fn with_feed(mut self, feed: Box<dyn SourceProvider>) -> Self {
        self.feeds.push(feed);
        self
    }

    pub fn with_translator(mut self, t: Translator) -> Self {
        self.translator = t;
        self
    }

    pub fn with_annotator(mut self, a: RelevanceAnnotator) -> Self {
        self.annotator = a;
        self
    }

    /// Fetch and classify everything; mutates `state` for seen RSS ids.
    async fn collect(
        &self,
        state: &mut RunState,
        since: Option<DateTime<Utc>>,
        summary: &mut RunSummary,
    ) -> Vec<(FeedItem, Origin)> {
        let mut queue = Vec::new();

        if let Some(src) = &self.releases {
            match src.fetch_releases().await {
                Ok(all) => {
                    summary.fetched += all.len();
                    let (fresh, newest) = select_new_releases(all, state.last_seen_id(), since);
                    tracing::info!(
                        feed = %self.opts.release_source_name,
                        new = fresh.len(),
                        last_seen_id = state.last_seen_id(),
                        newest,
                        "release feed checked"
                    );
                    for r in fresh {
                        let id = r.id;
                        let item = release_to_item(r, &self.opts.release_source_name);
                        queue.push((item, Origin::Release(id)));
                    }
                }
                Err(e) => {
                    tracing::warn!(feed = %self.opts.release_source_name, "source failed: {e:#}");
                    counter!("notifier_source_errors_total").increment(1);
                    summary.source_errors += 1;
                }
            }
        }

        for feed in &self.feeds {
            match feed.fetch_latest().await {
                Ok(items) => {
                    summary.fetched += items.len();
                    let sel = select_new(
                        items,
                        state.seen_ids(feed.name()),
                        since,
                        self.opts.max_items_per_feed,
                    );
                    tracing::info!(
                        feed = feed.name(),
                        new = sel.items.len(),
                        stale = sel.stale,
                        duplicates = sel.duplicates,
                        "rss feed checked"
                    );
                    state.set_seen_ids(feed.name(), sel.seen_ids);
                    queue.extend(sel.items.into_iter().map(|i| (i, Origin::Rss)));
                }
                Err(e) => {
                    tracing::warn!(feed = feed.name(), "source failed: {e:#}");
                    counter!("notifier_source_errors_total").increment(1);
                    summary.source_errors += 1;
                }
            }
        }

        queue
    }

    /// Run once at `now`. Never fails: every error below this level is
    /// logged and turned into a count in the summary.
    pub async fn run_once(&self, state: &mut RunState, now: DateTime<Utc>) -> RunSummary {
        crate::ingest::ensure_metrics_described();
        let mut summary = RunSummary::default();
        let since = self.opts.recency.since(now);
        let today = now.date_naive();

        let queue = self.collect(state, since, &mut summary).await;
        summary.new_items = queue.len();
        counter!("notifier_items_new_total").increment(queue.len() as u64);
        if queue.is_empty() {
            tracing::info!("no new items");
        }

        for (n, (item, origin)) in queue.into_iter().enumerate() {
            if n > 0 && !self.opts.send_pause.is_zero() {
                tokio::time::sleep(self.opts.send_pause).await;
            }
            tracing::info!(id = %item.id, title = %item.title, "processing");

            let summary_text = self
                .translator
                .translate(&item.summary, &self.opts.target_lang)
                .await;
            let relevance = self.annotator.annotate(&item).await;
            let note = Notification {
                item,
                summary: summary_text,
                relevance,
            };

            let report = self.mux.notify(&note, state, today).await;
            if report.failed.is_empty() {
                summary.sent += 1;
            } else {
                summary.failed += 1;
                for sink in report.failed {
                    *summary.sink_failures.entry(sink).or_default() += 1;
                }
            }

            // at-most-once: advance even when a sink failed
            if let Origin::Release(id) = origin {
                state.advance_last_seen_id(id);
            }
        }

        gauge!("notifier_last_run_ts").set(now.timestamp() as f64);
        summary
    }
}

/// Wire a pipeline from configuration.
pub fn build_pipeline(cfg: &AppConfig) -> Result<Pipeline> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("reqwest client")?;

    let mut sinks: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(slack) = &cfg.slack {
        sinks.push(Box::new(SlackNotifier::new(slack, http.clone())));
    }
    if let Some(notion) = &cfg.notion {
        sinks.push(Box::new(NotionNotifier::new(notion, http.clone())));
    }

    let feeds = match &cfg.feeds_path {
        Some(p) => load_feeds_from(p),
        None => load_feeds_default(),
    }
    .unwrap_or_else(|e| {
        tracing::warn!("feed list unusable, RSS disabled: {e:#}");
        Vec::new()
    });

    let environment = cfg
        .environment_path
        .as_deref()
        .and_then(|p| match EnvironmentProfile::load_from(p) {
            Ok(env) => Some(env),
            Err(e) => {
                tracing::warn!("environment description unusable, relevance notes disabled: {e:#}");
                None
            }
        });

    let generator = build_generator(&cfg.llm, http.clone());
    let translator = Translator::new(&cfg.translate, http.clone(), generator.clone());
    let annotator = RelevanceAnnotator::new(generator, environment);

    let mut pipeline = Pipeline::new(NotifierMux::new(sinks), RunOptions::from_config(cfg))
        .with_translator(translator)
        .with_annotator(annotator);
    if let Some(url) = &cfg.release_feed_url {
        let client = ReleaseFeedClient::new(url.clone(), http.clone());
        pipeline = pipeline.with_release_source(Box::new(client));
    }
    for feed in feeds {
        tracing::debug!(feed = %feed.id, url = %feed.url, "rss feed configured");
        pipeline = pipeline.with_feed(Box::new(RssFeedProvider::from_config(feed, http.clone())));
    }
    Ok(pipeline)
}

/// Full process run. State is written once, at the end, even when nothing was new.
pub async fn run(cfg: &AppConfig) -> Result<RunSummary> {
    let metrics = match &cfg.metrics_textfile {
        Some(_) => match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("metrics disabled: {e:#}");
                None
            }
        },
        None => None,
    };

    let pipeline = build_pipeline(cfg)?;
    tracing::info!(sinks = ?pipeline.mux.names(), "starting run");

    let mut state = RunState::load(&cfg.state_path).await;
    tracing::info!(last_seen_id = state.last_seen_id(), "state loaded");

    let summary = pipeline.run_once(&mut state, Utc::now()).await;

    state
        .save(&cfg.state_path)
        .await
        .context("persist state")?;
    tracing::info!(
        fetched = summary.fetched,
        new = summary.new_items,
        sent = summary.sent,
        failed = summary.failed,
        source_errors = summary.source_errors,
        sink_failures = ?summary.sink_failures,
        last_seen_id = state.last_seen_id(),
        "run finished"
    );

    if let (Some(m), Some(path)) = (&metrics, &cfg.metrics_textfile) {
        m.mark_run_finished();
        if let Err(e) = m.write_textfile(path) {
            tracing::warn!("metrics textfile not written: {e:#}");
        }
    }
    Ok(summary)
}
