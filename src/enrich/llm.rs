//! Text-generation provider abstraction (OpenAI-compatible chat completions).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

pub type GenFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A remote text-generation service.
pub trait TextGenerator: Send + Sync {
    /// One system + one user message in, trimmed completion text out.
    fn complete<'a>(&'a self, system: &'a str, user: &'a str, timeout: Duration) -> GenFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynGenerator = Arc<dyn TextGenerator>;

/// Build the configured generator, or `None` when no API key is present.
pub fn build_generator(cfg: &LlmConfig, http: reqwest::Client) -> Option<DynGenerator> {
    let key = cfg.api_key.as_deref().filter(|k| !k.is_empty())?;
    Some(Arc::new(OpenAiGenerator {
        http,
        api_key: key.to_string(),
        model: cfg.model.clone(),
        endpoint: format!("{}/chat/completions", cfg.api_base.trim_end_matches('/')),
    }))
}

/// OpenAI Chat Completions API.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl TextGenerator for OpenAiGenerator {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str, timeout: Duration) -> GenFuture<'a> {
        Box::pin(async move {
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: 0.2,
                max_tokens: 800,
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .timeout(timeout)
                .json(&req)
                .send()
                .await
                .context("llm request")?;

            let status = resp.status();
            if !status.is_success() {
                bail!("llm HTTP {status}");
            }
            let body: Resp = resp.json().await.context("llm response JSON")?;
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            if content.is_empty() {
                return Err(anyhow!("llm returned empty content"));
            }
            Ok(content)
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
