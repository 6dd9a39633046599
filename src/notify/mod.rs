// src/notify/mod.rs
pub mod format;
pub mod notion;
pub mod slack;

use anyhow::Result;
use chrono::NaiveDate;
use metrics::counter;

use crate::ingest::types::FeedItem;
use crate::state::RunState;

/// An item ready to send: the (possibly translated) summary and an
/// optional relevance note ride along with the normalized item.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub item: FeedItem,
    pub summary: String,
    pub relevance: Option<String>,
}

/// One outbound destination.
///
/// Sinks that lazily create containers (a daily page, a daily database)
/// cache their ids in `state` for the given `today`.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        note: &Notification,
        state: &mut RunState,
        today: NaiveDate,
    ) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Per-item delivery outcome across all sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

/// Fans one notification out to every configured sink. A failing sink is
/// logged and counted; the others still run.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn notify(
        &self,
        note: &Notification,
        state: &mut RunState,
        today: NaiveDate,
    ) -> SendReport {
        let mut report = SendReport::default();
        for sink in &self.sinks {
            match sink.send(note, state, today).await {
                Ok(()) => {
                    tracing::info!(sink = sink.name(), id = %note.item.id, "posted");
                    report.delivered.push(sink.name());
                }
                Err(e) => {
                    tracing::error!(sink = sink.name(), id = %note.item.id, "send failed: {e:#}");
                    counter!("notifier_sink_errors_total", "sink" => sink.name()).increment(1);
                    report.failed.push(sink.name());
                }
            }
        }
        report
    }
}
