// src/ingest/rss.rs
//! Regex-based RSS 2.0 / Atom extraction.
//!
//! Feeds in the wild are too loosely formed for a strict XML deserializer,
//! so items are scanned block by block. Everything goes through [`parse`];
//! callers never see the scanning details.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::ingest::dates::parse_feed_date;
use crate::ingest::types::{FeedConfig, FeedItem, FeedKind, SourceProvider};
use crate::ingest::{normalize_text, truncate_chars, SUMMARY_MAX_CHARS};

fn block_regex(cell: &'static OnceCell<Regex>, tag: &str) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>(.*?)</{tag}\s*>")).expect("block regex")
    })
}

/// Compiled once per distinct pattern; the tag and attribute sets are small and fixed.
fn cached_regex(pattern: String) -> Option<Regex> {
    static CACHE: OnceCell<Mutex<HashMap<String, Regex>>> = OnceCell::new();
    let mut cache = CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(re) = cache.get(&pattern) {
        return Some(re.clone());
    }
    let re = Regex::new(&pattern).ok()?;
    cache.insert(pattern, re.clone());
    Some(re)
}

/// Inner text of the first `<tag>` in `block`, with every CDATA section
/// unwrapped in place so text around a section is kept.
/// `tag` may carry a namespace prefix (`content:encoded`, `dc:date`).
pub fn extract_tag_content(block: &str, tag: &str) -> Option<String> {
    static RE_CDATA: OnceCell<Regex> = OnceCell::new();

    let t = regex::escape(tag);
    // a CDATA section may itself contain `</tag>`; consume it whole
    let re = cached_regex(format!(
        r"(?is)<{t}(?:\s[^>]*)?>((?:<!\[CDATA\[.*?\]\]>|.)*?)</{t}\s*>"
    ))?;
    let inner = re.captures(block)?.get(1)?.as_str();
    let cdata = RE_CDATA
        .get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("cdata regex"));
    Some(cdata.replace_all(inner, "$1").into_owned())
}

fn first_non_empty(block: &str, tags: &[&str]) -> String {
    tags.iter()
        .filter_map(|t| extract_tag_content(block, t))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn attr(tag: &str, name: &str) -> Option<String> {
    let re = cached_regex(format!(r#"(?i)\b{name}\s*=\s*["']([^"']*)["']"#))?;
    re.captures(tag)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Atom `<link>`: `rel="alternate"` first, any `href` otherwise.
fn atom_link(entry: &str) -> String {
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    let re = RE_LINK.get_or_init(|| Regex::new(r"(?i)<link\b[^>]*>").expect("link regex"));

    let links: Vec<&str> = re.find_iter(entry).map(|m| m.as_str()).collect();
    let alternate = links.iter().find(|l| {
        attr(l, "rel")
            .map(|r| r.eq_ignore_ascii_case("alternate"))
            .unwrap_or(false)
    });
    alternate
        .and_then(|l| attr(l, "href"))
        .or_else(|| links.iter().find_map(|l| attr(l, "href")))
        .map(|h| clean_link(&h))
        .unwrap_or_default()
}

fn clean_link(raw: &str) -> String {
    let s = raw.trim();
    let s = s
        .strip_prefix("<![CDATA[")
        .and_then(|r| r.strip_suffix("]]>"))
        .unwrap_or(s);
    html_escape::decode_html_entities(s.trim()).into_owned()
}

/// Fallback identity for entries that carry neither id nor link.
fn content_hash(title: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(date.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(24);
    for b in digest.iter().take(12) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    format!("sha256:{out}")
}

struct RawFields {
    id: String,
    title: String,
    link: String,
    date: String,
    body: String,
}

fn build_item(raw: RawFields, feed: &FeedConfig) -> FeedItem {
    let title = normalize_text(&raw.title);
    let summary = truncate_chars(&normalize_text(&raw.body), SUMMARY_MAX_CHARS);
    let id = [raw.id.trim(), raw.link.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| content_hash(&title, &raw.date));

    FeedItem {
        id,
        title,
        link: raw.link,
        summary,
        published_at: parse_feed_date(&raw.date),
        source_name: feed.name.clone(),
        vendor_name: feed.vendor.clone(),
        kind: FeedKind::Rss,
        release: None,
    }
}

fn parse_atom_entry(entry: &str, feed: &FeedConfig) -> FeedItem {
    build_item(
        RawFields {
            id: first_non_empty(entry, &["id"]),
            title: first_non_empty(entry, &["title"]),
            link: atom_link(entry),
            date: first_non_empty(entry, &["published", "updated"]),
            body: first_non_empty(entry, &["content", "summary"]),
        },
        feed,
    )
}

fn parse_rss_item(item: &str, feed: &FeedConfig) -> FeedItem {
    build_item(
        RawFields {
            id: first_non_empty(item, &["guid"]),
            title: first_non_empty(item, &["title"]),
            link: clean_link(&first_non_empty(item, &["link"])),
            date: first_non_empty(item, &["pubDate", "dc:date"]),
            body: first_non_empty(item, &["description", "content:encoded"]),
        },
        feed,
    )
}

/// Parse Atom (if any `<entry>` exists) or RSS 2.0 `<item>` blocks.
/// A malformed block degrades to an item with empty fields; never fails.
pub fn parse(xml: &str, feed: &FeedConfig) -> Vec<FeedItem> {
    static RE_ENTRY: OnceCell<Regex> = OnceCell::new();
    static RE_ITEM: OnceCell<Regex> = OnceCell::new();

    let entries: Vec<&str> = block_regex(&RE_ENTRY, "entry")
        .captures_iter(xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !entries.is_empty() {
        return entries
            .into_iter()
            .map(|e| parse_atom_entry(e, feed))
            .collect();
    }

    block_regex(&RE_ITEM, "item")
        .captures_iter(xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .map(|i| parse_rss_item(i, feed))
        .collect()
}

/// One configured RSS/Atom feed.
pub struct RssFeedProvider {
    feed: FeedConfig,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssFeedProvider {
    pub fn from_fixture_str(feed: FeedConfig, xml: &str) -> Self {
        Self {
            feed,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_config(feed: FeedConfig, client: reqwest::Client) -> Self {
        Self {
            feed,
            mode: Mode::Http { client },
        }
    }

    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    fn parse_timed(&self, xml: &str) -> Vec<FeedItem> {
        let t0 = std::time::Instant::now();
        let items = parse(xml, &self.feed);
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("notifier_feed_parse_ms").record(ms);
        counter!("notifier_items_fetched_total").increment(items.len() as u64);
        items
    }
}

#[async_trait]
impl SourceProvider for RssFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>> {
        match &self.mode {
            Mode::Fixture(s) => Ok(self.parse_timed(s)),
            Mode::Http { client } => {
                let body = client
                    .get(&self.feed.url)
                    .timeout(Duration::from_secs(30))
                    .send()
                    .await
                    .with_context(|| format!("rss get {}", self.feed.url))?
                    .error_for_status()
                    .with_context(|| format!("rss non-2xx {}", self.feed.url))?
                    .text()
                    .await
                    .context("rss .text()")?;
                Ok(self.parse_timed(&body))
            }
        }
    }

    fn name(&self) -> &str {
        &self.feed.id
    }
}
