// src/ingest/releases.rs
//! The id-ordered JSON release feed.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::ingest::types::{FeedItem, FeedKind, Release, ReleaseExtras, ReleaseFeed};
use crate::ingest::{normalize_text, truncate_chars, SUMMARY_MAX_CHARS};

pub const DEFAULT_RELEASE_FEED_URL: &str =
    "https://releasebot.io/api/feed/bc2b4e2a-dad6-4245-a2c7-13a7bd9407d4.json";

/// Anything that can hand over the full release list.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_releases(&self) -> Result<Vec<Release>>;
}

pub struct ReleaseFeedClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ReleaseFeedClient {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self {
            url,
            client,
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl ReleaseSource for ReleaseFeedClient {
    async fn fetch_releases(&self) -> Result<Vec<Release>> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .context("release feed get")?
            .error_for_status()
            .context("release feed non-2xx")?;
        let body = resp.text().await.context("release feed .text()")?;
        let feed: ReleaseFeed =
            serde_json::from_str(&body).context("parse release feed JSON")?;
        counter!("notifier_items_fetched_total").increment(feed.releases.len() as u64);
        Ok(feed.releases)
    }
}

/// Releases newer than `last_seen_id` (and, with a window, dated at or after
/// `since`), oldest id first, plus the advanced last-seen id.
pub fn select_new_releases(
    releases: Vec<Release>,
    last_seen_id: u64,
    since: Option<DateTime<Utc>>,
) -> (Vec<Release>, u64) {
    let mut fresh: Vec<Release> = releases
        .into_iter()
        .filter(|r| r.id > last_seen_id)
        .filter(|r| match since {
            None => true,
            Some(cutoff) => r.released_at().is_some_and(|ts| ts >= cutoff),
        })
        .collect();
    fresh.sort_by_key(|r| r.id);
    let new_last = fresh.last().map(|r| r.id).unwrap_or(last_seen_id);
    (fresh, new_last.max(last_seen_id))
}

/// Fetch + select in one go.
pub async fn fetch_new(
    source: &dyn ReleaseSource,
    last_seen_id: u64,
    since: Option<DateTime<Utc>>,
) -> Result<(Vec<Release>, u64)> {
    let all = source.fetch_releases().await?;
    Ok(select_new_releases(all, last_seen_id, since))
}

/// Normalize a release into the feed-agnostic shape.
pub fn release_to_item(release: Release, source_name: &str) -> FeedItem {
    let vendor = release.vendor_name().to_string();
    let product = release.product_name().to_string();
    let title = if vendor.is_empty() {
        product
    } else {
        format!("{vendor} {product}")
    };
    FeedItem {
        id: release.id.to_string(),
        title,
        link: String::new(),
        summary: truncate_chars(&normalize_text(release.summary()), SUMMARY_MAX_CHARS),
        published_at: release.released_at(),
        source_name: source_name.to_string(),
        vendor_name: vendor,
        kind: FeedKind::StructuredRelease,
        release: Some(ReleaseExtras {
            version: release.version().to_string(),
            vendor_slug: release.vendor_slug().to_string(),
            release,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Product, ReleaseDetails, Vendor};
    use chrono::TimeZone;

    fn rel(id: u64, date: Option<&str>) -> Release {
        Release {
            id,
            release_date: date.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn keeps_only_newer_ids_sorted_ascending() {
        let (out, last) =
            select_new_releases(vec![rel(7, None), rel(5, None), rel(6, None)], 5, None);
        let ids: Vec<u64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![6, 7]);
        assert_eq!(last, 7);
    }

    #[test]
    fn nothing_new_keeps_last_seen() {
        let (out, last) = select_new_releases(vec![rel(3, None)], 9, None);
        assert!(out.is_empty());
        assert_eq!(last, 9);
    }

    #[test]
    fn window_drops_undated_and_old_releases() {
        let since = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let input = vec![
            rel(1, None),
            rel(2, Some("2024-01-01")),
            rel(3, Some("2024-01-12T08:00:00Z")),
            rel(4, Some("garbage")),
        ];
        let (out, last) = select_new_releases(input, 0, Some(since));
        let ids: Vec<u64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(last, 3);
    }

    #[test]
    fn release_item_carries_version_and_vendor() {
        let r = Release {
            id: 42,
            product: Some(Product {
                display_name: Some("Widget".into()),
                vendor: Some(Vendor {
                    display_name: Some("Acme".into()),
                    slug: Some("acme".into()),
                }),
            }),
            release_details: Some(ReleaseDetails {
                release_summary: Some("<p>Fixes &amp; features</p>".into()),
                release_number: None,
                release_name: Some("Spring".into()),
            }),
            release_date: Some("2024-03-01".into()),
            created_at: None,
        };
        let item = release_to_item(r, "Releasebot");
        assert_eq!(item.id, "42");
        assert_eq!(item.title, "Acme Widget");
        assert_eq!(item.summary, "Fixes & features");
        assert_eq!(item.kind, FeedKind::StructuredRelease);
        let extras = item.release.unwrap();
        assert_eq!(extras.version, "Spring");
        assert_eq!(extras.vendor_slug, "acme");
    }
}
