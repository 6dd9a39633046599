// src/config/environment.rs
//! The user's declared tool environment (tools, skills, active projects).
//! Kept opaque: it is only ever serialized into a prompt.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentProfile {
    raw: Value,
}

impl EnvironmentProfile {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    /// JSON or TOML document; anything else is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading environment from {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(v) = serde_json::from_str::<Value>(s) {
            return Self::non_empty(v);
        }
        if let Ok(v) = toml::from_str::<Value>(s) {
            return Self::non_empty(v);
        }
        Err(anyhow!("environment description is neither JSON nor TOML"))
    }

    fn non_empty(v: Value) -> Result<Self> {
        match &v {
            Value::Null => Err(anyhow!("environment description is empty")),
            Value::Object(m) if m.is_empty() => Err(anyhow!("environment description is empty")),
            _ => Ok(Self { raw: v }),
        }
    }

    /// Pretty JSON for embedding into prompts.
    pub fn to_prompt_text(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| self.raw.to_string())
    }
}
