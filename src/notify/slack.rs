use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::format::{slack_message, SlackMessage};
use super::{Notification, Notifier};
use crate::config::SlackConfig;
use crate::state::RunState;

/// Web API client for `chat.postMessage` (bot token, not a webhook).
pub struct SlackNotifier {
    token: String,
    channel: String,
    endpoint: String,
    client: Client,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SlackResp {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    pub fn new(cfg: &SlackConfig, client: Client) -> Self {
        Self {
            token: cfg.bot_token.clone(),
            channel: cfg.channel_id.clone(),
            endpoint: format!("{}/chat.postMessage", cfg.api_base.trim_end_matches('/')),
            client,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn post_message(&self, msg: &SlackMessage) -> Result<()> {
        let body = serde_json::json!({
            "channel": self.channel,
            "blocks": msg.blocks,
            "text": msg.text,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        let parsed: SlackResp = resp.json().await.context("parse slack response")?;
        if parsed.ok {
            Ok(())
        } else {
            Err(anyhow!(
                "Slack API error: {}",
                parsed.error.unwrap_or_else(|| "unknown".to_string())
            ))
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(
        &self,
        note: &Notification,
        _state: &mut RunState,
        _today: NaiveDate,
    ) -> Result<()> {
        self.post_message(&slack_message(note)).await
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
