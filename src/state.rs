// src/state.rs
//! Persisted dedup state. Read once at start, written once at the end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const DEFAULT_STATE_PATH: &str = "state/notifier_state.json";
/// Plain-text state written by older deployments (just the last id).
pub const LEGACY_LAST_SEEN_FILE: &str = "last_seen_id.txt";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredFeedState {
    #[serde(default)]
    pub last_seen_id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RssFeedState {
    #[serde(default)]
    pub seen_ids: Vec<String>,
}

/// Lazily created destination container (daily page or database).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SinkBootstrap {
    pub id: String,
    pub created_on: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    #[serde(default)]
    pub structured_feed: StructuredFeedState,
    #[serde(default)]
    pub rss: BTreeMap<String, RssFeedState>,
    #[serde(default)]
    pub sink_bootstrap: BTreeMap<String, SinkBootstrap>,
}

impl RunState {
    /// Load from `path`. Missing or unparseable files give the empty state,
    /// except that a legacy `last_seen_id.txt` beside `path` seeds the last id.
    pub async fn load(path: &Path) -> Self {
        match fs::read_to_string(path).await {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(st) => st,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "state unparseable, starting fresh"
                    );
                    Self::default()
                }
            },
            Err(_) => {
                let mut st = Self::default();
                if let Some(id) = read_legacy_last_seen(&legacy_path(path)).await {
                    tracing::info!(last_seen_id = id, "seeded state from legacy last_seen_id.txt");
                    st.structured_feed.last_seen_id = id;
                } else {
                    tracing::info!(
                        path = %path.display(),
                        "no previous state found, starting fresh"
                    );
                }
                st
            }
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create state dir {}", dir.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self).context("serialize state")?;
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }

    pub fn last_seen_id(&self) -> u64 {
        self.structured_feed.last_seen_id
    }

    /// Only ever moves forward.
    pub fn advance_last_seen_id(&mut self, id: u64) {
        if id > self.structured_feed.last_seen_id {
            self.structured_feed.last_seen_id = id;
        }
    }

    pub fn seen_ids(&self, feed_id: &str) -> &[String] {
        self.rss
            .get(feed_id)
            .map(|f| f.seen_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_seen_ids(&mut self, feed_id: &str, ids: Vec<String>) {
        self.rss.entry(feed_id.to_string()).or_default().seen_ids = ids;
    }

    /// Cached container id, valid only on the day it was created.
    pub fn bootstrap_for(&self, key: &str, today: NaiveDate) -> Option<&str> {
        self.sink_bootstrap
            .get(key)
            .filter(|b| b.created_on == today)
            .map(|b| b.id.as_str())
    }

    pub fn record_bootstrap(&mut self, key: &str, id: String, today: NaiveDate) {
        self.sink_bootstrap.insert(
            key.to_string(),
            SinkBootstrap {
                id,
                created_on: today,
            },
        );
    }
}

fn legacy_path(state_path: &Path) -> PathBuf {
    state_path.with_file_name(LEGACY_LAST_SEEN_FILE)
}

async fn read_legacy_last_seen(path: &Path) -> Option<u64> {
    let s = fs::read_to_string(path).await.ok()?;
    s.trim().parse::<u64>().ok()
}
