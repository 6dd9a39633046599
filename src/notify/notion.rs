//! Notion REST client plus the daily page / daily database sink.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

use super::format::{notion_blocks, notion_database_schema, notion_row_properties, rich_text};
use super::{Notification, Notifier};
use crate::config::{NotionConfig, NotionMode};
use crate::state::RunState;

pub const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionClient {
    api_key: String,
    base: String,
    client: Client,
    timeout: Duration,
}

impl NotionClient {
    pub fn new(api_key: String, base: &str, client: Client) -> Self {
        Self {
            api_key,
            base: base.trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(15),
        }
    }

    async fn call(&self, method: Method, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        let resp = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("notion request {path}"))?;
        let status = resp.status();
        let text = resp.text().await.context("notion response body")?;
        if !status.is_success() {
            let msg = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            bail!("Notion API error {status}: {msg}");
        }
        serde_json::from_str(&text).context("notion response JSON")
    }

    fn id_of(v: &Value) -> Result<String> {
        v.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("notion response without id"))
    }

    /// Child page under `parent_page_id`; returns the new page id.
    pub async fn create_page(
        &self,
        parent_page_id: &str,
        title: &str,
        children: Vec<Value>,
    ) -> Result<String> {
        let body = json!({
            "parent": { "page_id": parent_page_id },
            "properties": { "title": { "title": [rich_text(title, None)] } },
            "children": children,
        });
        Self::id_of(&self.call(Method::POST, "/pages", &body).await?)
    }

    /// Inline database under `parent_page_id`; returns the database id.
    pub async fn create_database(
        &self,
        parent_page_id: &str,
        title: &str,
        properties: Value,
    ) -> Result<String> {
        let body = json!({
            "parent": { "type": "page_id", "page_id": parent_page_id },
            "title": [rich_text(title, None)],
            "properties": properties,
        });
        Self::id_of(&self.call(Method::POST, "/databases", &body).await?)
    }

    pub async fn append_blocks(&self, block_id: &str, children: Vec<Value>) -> Result<()> {
        let body = json!({ "children": children });
        self.call(Method::PATCH, &format!("/blocks/{block_id}/children"), &body)
            .await?;
        Ok(())
    }

    pub async fn create_row(&self, database_id: &str, properties: Value) -> Result<String> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        Self::id_of(&self.call(Method::POST, "/pages", &body).await?)
    }
}

/// Writes each item into a per-day container under a fixed parent page.
pub struct NotionNotifier {
    client: NotionClient,
    parent_page_id: String,
    mode: NotionMode,
}

impl NotionNotifier {
    pub fn new(cfg: &NotionConfig, http: Client) -> Self {
        Self {
            client: NotionClient::new(cfg.api_key.clone(), &cfg.api_base, http),
            parent_page_id: cfg.parent_page_id.clone(),
            mode: cfg.mode,
        }
    }

    pub fn bootstrap_key(&self) -> &'static str {
        match self.mode {
            NotionMode::Page => "notion:page",
            NotionMode::Database => "notion:database",
        }
    }

    /// Today's container id, creating it on first use.
    async fn container(&self, state: &mut RunState, today: NaiveDate) -> Result<String> {
        let key = self.bootstrap_key();
        if let Some(id) = state.bootstrap_for(key, today) {
            return Ok(id.to_string());
        }
        let title = format!("릴리스 노트 {}", today.format("%Y-%m-%d"));
        let id = match self.mode {
            NotionMode::Page => {
                self.client
                    .create_page(&self.parent_page_id, &title, Vec::new())
                    .await?
            }
            NotionMode::Database => {
                self.client
                    .create_database(&self.parent_page_id, &title, notion_database_schema())
                    .await?
            }
        };
        tracing::info!(key, id = %id, "created notion container");
        state.record_bootstrap(key, id.clone(), today);
        Ok(id)
    }
}

#[async_trait::async_trait]
impl Notifier for NotionNotifier {
    async fn send(
        &self,
        note: &Notification,
        state: &mut RunState,
        today: NaiveDate,
    ) -> Result<()> {
        let container = self.container(state, today).await?;
        match self.mode {
            NotionMode::Page => self.client.append_blocks(&container, notion_blocks(note)).await,
            NotionMode::Database => self
                .client
                .create_row(&container, notion_row_properties(note))
                .await
                .map(|_| ()),
        }
    }

    fn name(&self) -> &'static str {
        "notion"
    }
}
