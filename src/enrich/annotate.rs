//! Optional relevance note: asks the text-generation service how much an
//! item matters for the user's declared environment.

use std::time::Duration;

use crate::config::EnvironmentProfile;
use crate::enrich::llm::DynGenerator;
use crate::ingest::types::FeedItem;

pub struct RelevanceAnnotator {
    generator: Option<DynGenerator>,
    environment: Option<EnvironmentProfile>,
    timeout: Duration,
}

impl RelevanceAnnotator {
    pub fn new(generator: Option<DynGenerator>, environment: Option<EnvironmentProfile>) -> Self {
        Self {
            generator,
            environment,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some() && self.environment.is_some()
    }

    /// `None` when disabled or when the call fails for any reason.
    pub async fn annotate(&self, item: &FeedItem) -> Option<String> {
        let (Some(gen), Some(env)) = (&self.generator, &self.environment) else {
            return None;
        };
        let (system, user) = build_prompt(item, env);
        match gen.complete(system, &user, self.timeout).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(id = %item.id, "relevance annotation failed: {e:#}");
                None
            }
        }
    }
}

const SYSTEM_PROMPT: &str = "You rate how relevant a software release or announcement is \
to one engineer's environment. Answer in Korean, at most three short lines: \
first line `관련도: 높음|중간|낮음`, then one or two lines on why and what to check.";

/// System and user messages for one item.
pub fn build_prompt(item: &FeedItem, env: &EnvironmentProfile) -> (&'static str, String) {
    let version = item
        .release
        .as_ref()
        .map(|r| r.version.as_str())
        .unwrap_or_default();
    let user = format!(
        "## Item\nVendor: {vendor}\nTitle: {title}\nVersion: {version}\nSummary: {summary}\n\n\
         ## My environment\n{env}",
        vendor = item.vendor_name,
        title = item.title,
        summary = item.summary,
        env = env.to_prompt_text(),
    );
    (SYSTEM_PROMPT, user)
}
