// src/config/app.rs
//! Process configuration, built once from the environment and passed down.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::ingest::dates::RecencyWindow;
use crate::ingest::releases::DEFAULT_RELEASE_FEED_URL;
use crate::state::DEFAULT_STATE_PATH;

pub const DEFAULT_SLACK_CHANNEL_ID: &str = "C0ACH02BLG5";
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_DEEPL_URL: &str = "https://api-free.deepl.com/v2/translate";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Slack,
    Notion,
}

impl SinkKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slack" => Some(Self::Slack),
            "notion" => Some(Self::Notion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotionMode {
    /// One child page per day; items appended as blocks.
    Page,
    /// One database per day; one row per item.
    Database,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: String,
    pub parent_page_id: String,
    pub mode: NotionMode,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub deepl_api_key: Option<String>,
    pub deepl_url: String,
    pub target_lang: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` disables the structured release feed.
    pub release_feed_url: Option<String>,
    pub feeds_path: Option<PathBuf>,
    pub environment_path: Option<PathBuf>,
    pub state_path: PathBuf,
    pub recency: RecencyWindow,
    pub max_items_per_feed: usize,
    pub send_pause: Duration,
    pub slack: Option<SlackConfig>,
    pub notion: Option<NotionConfig>,
    pub translate: TranslateConfig,
    pub llm: LlmConfig,
    pub metrics_textfile: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup. Fails only when a selected mandatory sink
    /// lacks its credential (or nothing can be sent at all).
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let sinks: Vec<SinkKind> = match var("SINKS") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| SinkKind::parse(s).ok_or_else(|| anyhow!("unknown sink in SINKS: {s}")))
                .collect::<Result<_>>()?,
            None => vec![SinkKind::Slack],
        };

        let slack = if sinks.contains(&SinkKind::Slack) {
            let Some(bot_token) = var("SLACK_BOT_TOKEN") else {
                bail!("SLACK_BOT_TOKEN environment variable is required");
            };
            Some(SlackConfig {
                bot_token,
                channel_id: var("SLACK_CHANNEL_ID")
                    .unwrap_or_else(|| DEFAULT_SLACK_CHANNEL_ID.to_string()),
                api_base: var("SLACK_API_BASE")
                    .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string()),
            })
        } else {
            None
        };

        let notion = if sinks.contains(&SinkKind::Notion) {
            match (var("NOTION_API_KEY"), var("NOTION_PARENT_PAGE_ID")) {
                (Some(api_key), Some(parent_page_id)) => Some(NotionConfig {
                    api_key,
                    parent_page_id,
                    mode: match var("NOTION_MODE").as_deref() {
                        Some(m) if m.eq_ignore_ascii_case("database") => NotionMode::Database,
                        _ => NotionMode::Page,
                    },
                    api_base: var("NOTION_API_BASE")
                        .unwrap_or_else(|| DEFAULT_NOTION_API_BASE.to_string()),
                }),
                _ => {
                    tracing::warn!(
                        "NOTION_API_KEY / NOTION_PARENT_PAGE_ID not set, Notion sink skipped"
                    );
                    None
                }
            }
        } else {
            None
        };

        if slack.is_none() && notion.is_none() {
            bail!("no usable sink configured (SINKS={sinks:?})");
        }

        let deepl_api_key = var("DEEPL_API_KEY");
        if deepl_api_key.is_none() {
            tracing::warn!(
                "DEEPL_API_KEY not set, translations will use the LLM fallback or be skipped"
            );
        }
        let llm_key = var("OPENAI_API_KEY");
        if llm_key.is_none() {
            tracing::warn!(
                "OPENAI_API_KEY not set, relevance notes and fallback translation disabled"
            );
        }

        let parse_num = |k: &str| -> Result<Option<u64>> {
            var(k)
                .map(|v| v.parse::<u64>().map_err(|_| anyhow!("{k} must be a number, got {v:?}")))
                .transpose()
        };

        let recency = match parse_num("RECENCY_WINDOW_DAYS")? {
            Some(d) if d > 0 => RecencyWindow::days(u32::try_from(d).unwrap_or(u32::MAX)),
            _ => RecencyWindow::disabled(),
        };

        let release_feed_url = match var("RELEASE_FEED_URL") {
            Some(u) if u.eq_ignore_ascii_case("off") => None,
            Some(u) => Some(u),
            None => Some(DEFAULT_RELEASE_FEED_URL.to_string()),
        };

        Ok(Self {
            release_feed_url,
            feeds_path: var("RSS_FEEDS_PATH").map(PathBuf::from),
            environment_path: var("ENVIRONMENT_PATH").map(PathBuf::from),
            state_path: var("STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            recency,
            max_items_per_feed: parse_num("MAX_ITEMS_PER_FEED")?.unwrap_or(10) as usize,
            send_pause: Duration::from_millis(parse_num("SEND_PAUSE_MS")?.unwrap_or(1_000)),
            slack,
            notion,
            translate: TranslateConfig {
                deepl_api_key,
                deepl_url: var("DEEPL_API_URL").unwrap_or_else(|| DEFAULT_DEEPL_URL.to_string()),
                target_lang: var("TRANSLATE_TARGET_LANG").unwrap_or_else(|| "KO".to_string()),
                timeout: Duration::from_secs(10),
            },
            llm: LlmConfig {
                api_key: llm_key,
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                api_base: var("OPENAI_API_BASE")
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            },
            metrics_textfile: var("METRICS_TEXTFILE").map(PathBuf::from),
        })
    }
}
