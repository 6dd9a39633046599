//! Best-effort summary translation: DeepL first, LLM fallback second.
//! Every failure collapses to the original text.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use metrics::counter;
use serde::Deserialize;

use crate::config::TranslateConfig;
use crate::enrich::llm::DynGenerator;

pub struct Translator {
    http: reqwest::Client,
    deepl_key: Option<String>,
    deepl_url: String,
    timeout: Duration,
    fallback: Option<DynGenerator>,
}

#[derive(Deserialize)]
struct DeeplResp {
    #[serde(default)]
    translations: Vec<DeeplTranslation>,
}

#[derive(Deserialize)]
struct DeeplTranslation {
    text: String,
}

impl Translator {
    pub fn new(
        cfg: &TranslateConfig,
        http: reqwest::Client,
        fallback: Option<DynGenerator>,
    ) -> Self {
        Self {
            http,
            deepl_key: cfg.deepl_api_key.clone().filter(|k| !k.is_empty()),
            deepl_url: cfg.deepl_url.clone(),
            timeout: cfg.timeout,
            fallback,
        }
    }

    /// Translator that never touches the network.
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            deepl_key: None,
            deepl_url: String::new(),
            timeout: Duration::from_secs(10),
            fallback: None,
        }
    }

    /// Translate `text` into `target` (a DeepL language code, e.g. `KO`).
    /// Returns `text` unchanged on any failure.
    pub async fn translate(&self, text: &str, target: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        if let Some(key) = &self.deepl_key {
            match self.deepl(key, text, target).await {
                Ok(t) if t != text => {
                    counter!("notifier_translations_total").increment(1);
                    return t;
                }
                Ok(_) => tracing::debug!("deepl returned the input unchanged"),
                Err(e) => tracing::warn!("translation failed, trying fallback: {e:#}"),
            }
        }

        if let Some(gen) = &self.fallback {
            match self.llm(gen, text, target).await {
                Ok(t) => {
                    counter!("notifier_translations_total").increment(1);
                    return t;
                }
                Err(e) => {
                    tracing::warn!("fallback translation failed, using original text: {e:#}")
                }
            }
        }

        text.to_string()
    }

    async fn deepl(&self, key: &str, text: &str, target: &str) -> Result<String> {
        let resp = self
            .http
            .post(&self.deepl_url)
            .timeout(self.timeout)
            .form(&[("auth_key", key), ("text", text), ("target_lang", target)])
            .send()
            .await
            .context("deepl request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("deepl HTTP {status}");
        }
        let body: DeeplResp = resp.json().await.context("deepl response JSON")?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("deepl response had no translations"))
    }

    async fn llm(&self, gen: &DynGenerator, text: &str, target: &str) -> Result<String> {
        let system = format!(
            "Translate the user's text into the language with code {target}. \
             Keep product names, version numbers and code as-is. Output only the translation."
        );
        let out = gen.complete(&system, text, self.timeout).await?;
        let out = out.trim();
        if out.is_empty() {
            bail!("fallback translation empty");
        }
        Ok(out.to_string())
    }
}
