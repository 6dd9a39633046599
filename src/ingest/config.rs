// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedConfig;

const ENV_PATH: &str = "RSS_FEEDS_PATH";

/// Load the RSS feed list from an explicit path. Supports TOML or JSON formats.
/// Disabled feeds are dropped here so callers only see active ones.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Load the feed list using env var + fallbacks:
/// 1) $RSS_FEEDS_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
///
/// No file at all means "no RSS feeds".
pub fn load_feeds_default() -> Result<Vec<FeedConfig>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        } else {
            return Err(anyhow!("RSS_FEEDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedConfig>> {
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feed list format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedConfig>> {
    #[derive(serde::Deserialize)]
    struct TomlFeeds {
        feeds: Vec<FeedConfig>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_list(v.feeds))
}

/// Accepts either a bare array or `{ "feeds": [...] }`.
fn parse_json(s: &str) -> Result<Vec<FeedConfig>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum JsonFeeds {
        Bare(Vec<FeedConfig>),
        Wrapped { feeds: Vec<FeedConfig> },
    }
    let v: JsonFeeds = serde_json::from_str(s)?;
    let feeds = match v {
        JsonFeeds::Bare(f) | JsonFeeds::Wrapped { feeds: f } => f,
    };
    Ok(clean_list(feeds))
}

/// Enabled feeds with a url, first occurrence of each id wins.
fn clean_list(items: Vec<FeedConfig>) -> Vec<FeedConfig> {
    use std::collections::HashSet;
    let mut ids = HashSet::new();
    items
        .into_iter()
        .filter(|f| f.enabled && !f.url.trim().is_empty() && !f.id.trim().is_empty())
        .filter(|f| ids.insert(f.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const TOML: &str = r#"
[[feeds]]
id = "aws"
name = "AWS What's New"
vendor = "AWS"
url = "https://aws.amazon.com/new/feed/"

[[feeds]]
id = "off"
name = "Disabled"
url = "https://example.com/rss"
enabled = false
"#;

    #[test]
    fn toml_and_json_formats_work() {
        let t = parse_feeds(TOML, "toml").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].id, "aws");
        assert!(t[0].enabled);

        let bare = r#"[{"id":"a","name":"A","vendor":"V","url":"https://a"},{"id":"a","name":"dup","url":"https://b"}]"#;
        let j = parse_feeds(bare, "json").unwrap();
        assert_eq!(j.len(), 1);
        assert_eq!(j[0].name, "A");

        let wrapped = r#"{"feeds":[{"id":"b","name":"B","url":"https://b"}]}"#;
        let w = parse_feeds(wrapped, "").unwrap();
        assert_eq!(w[0].vendor, "");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feeds("not a feed list", "txt").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);
        assert!(load_feeds_default().unwrap().is_empty());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join("config/feeds.toml"), TOML).unwrap();
        assert_eq!(load_feeds_default().unwrap().len(), 1);

        let p_json = tmp.path().join("feeds.json");
        fs::write(&p_json, r#"[{"id":"x","name":"X","url":"https://x"}]"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let v = load_feeds_default().unwrap();
        assert_eq!(v[0].id, "x");
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
