// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static per-feed configuration. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FeedKind {
    StructuredRelease,
    Rss,
}

/// Fields only present on items that came from the structured release feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseExtras {
    pub version: String,
    pub vendor_slug: String,
    pub release: Release,
}

/// Normalized, feed-agnostic item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_name: String,
    pub vendor_name: String,
    pub kind: FeedKind,
    pub release: Option<ReleaseExtras>,
}

// --- structured release feed (JSON) ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseFeed {
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub id: u64,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub release_details: Option<ReleaseDetails>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Product {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub vendor: Option<Vendor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Vendor {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseDetails {
    #[serde(default)]
    pub release_summary: Option<String>,
    #[serde(default)]
    pub release_number: Option<String>,
    #[serde(default)]
    pub release_name: Option<String>,
}

impl Release {
    pub fn product_name(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.display_name.as_deref())
            .unwrap_or("Unknown Product")
    }

    pub fn vendor_name(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.vendor.as_ref())
            .and_then(|v| v.display_name.as_deref())
            .unwrap_or_default()
    }

    pub fn vendor_slug(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.vendor.as_ref())
            .and_then(|v| v.slug.as_deref())
            .unwrap_or_default()
    }

    /// `release_number`, else `release_name`, else empty.
    pub fn version(&self) -> &str {
        let details = self.release_details.as_ref();
        details
            .and_then(|d| d.release_number.as_deref())
            .filter(|s| !s.is_empty())
            .or_else(|| details.and_then(|d| d.release_name.as_deref()))
            .unwrap_or_default()
    }

    pub fn summary(&self) -> &str {
        self.release_details
            .as_ref()
            .and_then(|d| d.release_summary.as_deref())
            .unwrap_or_default()
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.release_date
            .as_deref()
            .and_then(crate::ingest::dates::parse_feed_date)
    }
}

/// A source of already-normalized items (one RSS feed, the release feed, a fixture).
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>>;
    fn name(&self) -> &str;
}
