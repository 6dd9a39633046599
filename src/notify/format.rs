//! Pure payload builders: one notification in, sink-shaped JSON out.

use serde_json::{json, Value};

use crate::ingest::dates::format_korean_date;
use crate::ingest::truncate_chars;
use crate::ingest::types::FeedKind;
use crate::notify::Notification;

const SLACK_SUMMARY_MAX: usize = 500;
const SLACK_HEADER_MAX: usize = 150;
const NOTION_TEXT_MAX: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct SlackMessage {
    pub blocks: Vec<Value>,
    /// Plain-text fallback for notifications and clients without blocks.
    pub text: String,
}

/// Slack mrkdwn control characters.
pub fn escape_mrkdwn(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", truncate_chars(s, max))
    } else {
        s.to_string()
    }
}

fn prefixed(vendor: &str, rest: &str) -> String {
    if vendor.is_empty() {
        rest.to_string()
    } else {
        format!("{vendor} {rest}")
    }
}

fn date_label(note: &Notification) -> Option<String> {
    note.item.published_at.as_ref().map(format_korean_date)
}

fn relevance_block(note: &Notification) -> Option<Value> {
    note.relevance.as_deref().filter(|r| !r.trim().is_empty()).map(|r| {
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*🎯 관련도 분석*\n{}", escape_mrkdwn(r.trim()))
            }
        })
    })
}

pub fn slack_message(note: &Notification) -> SlackMessage {
    match note.item.kind {
        FeedKind::StructuredRelease => slack_release(note),
        FeedKind::Rss => slack_rss(note),
    }
}

fn slack_release(note: &Notification) -> SlackMessage {
    let item = &note.item;
    let (product, version) = match &item.release {
        Some(r) => (r.release.product_name().to_string(), r.version.clone()),
        None => (item.title.clone(), String::new()),
    };
    let vendor = item.vendor_name.as_str();

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": truncate_chars(
                    &format!("🚀 {}", prefixed(vendor, &product)),
                    SLACK_HEADER_MAX
                ),
                "emoji": true
            }
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": if version.is_empty() {
                    "_버전 정보 없음_".to_string()
                } else {
                    format!("*버전:* `{version}`")
                }
            }
        }),
    ];

    if !note.summary.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": ellipsize(&escape_mrkdwn(&note.summary), SLACK_SUMMARY_MAX)
            }
        }));
    }
    if let Some(date) = date_label(note) {
        blocks.push(json!({
            "type": "context",
            "elements": [{ "type": "mrkdwn", "text": format!("📅 {date}") }]
        }));
    }
    blocks.extend(relevance_block(note));
    blocks.push(json!({ "type": "divider" }));

    let text = if version.is_empty() {
        format!("{} 릴리스", prefixed(vendor, &product))
    } else {
        format!("{} {version} 릴리스", prefixed(vendor, &product))
    };
    SlackMessage { blocks, text }
}

fn slack_rss(note: &Notification) -> SlackMessage {
    let item = &note.item;
    let title = if item.title.is_empty() {
        "(제목 없음)".to_string()
    } else {
        escape_mrkdwn(&item.title)
    };
    let headline = if item.link.is_empty() {
        format!("*{title}*")
    } else {
        format!("*<{}|{title}>*", item.link)
    };

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": truncate_chars(&format!("📰 {}", item.source_name), SLACK_HEADER_MAX),
                "emoji": true
            }
        }),
        json!({ "type": "section", "text": { "type": "mrkdwn", "text": headline } }),
    ];
    if !note.summary.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": ellipsize(&escape_mrkdwn(&note.summary), SLACK_SUMMARY_MAX)
            }
        }));
    }

    let mut meta = Vec::new();
    if !item.vendor_name.is_empty() {
        meta.push(format!("🏢 {}", item.vendor_name));
    }
    if let Some(date) = date_label(note) {
        meta.push(format!("📅 {date}"));
    }
    if !meta.is_empty() {
        blocks.push(json!({
            "type": "context",
            "elements": [{ "type": "mrkdwn", "text": meta.join(" · ") }]
        }));
    }
    blocks.extend(relevance_block(note));
    blocks.push(json!({ "type": "divider" }));

    SlackMessage {
        blocks,
        text: format!("{}: {}", item.source_name, item.title),
    }
}

// --- Notion ---

pub fn rich_text(content: &str, link: Option<&str>) -> Value {
    let link = link.filter(|l| !l.is_empty()).map(|url| json!({ "url": url }));
    json!({
        "type": "text",
        "text": { "content": truncate_chars(content, NOTION_TEXT_MAX), "link": link }
    })
}

fn paragraph(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": [rich_text(content, None)] }
    })
}

fn meta_line(note: &Notification) -> String {
    let mut parts = vec![note.item.source_name.clone()];
    if !note.item.vendor_name.is_empty() {
        parts.push(note.item.vendor_name.clone());
    }
    if let Some(v) = note
        .item
        .release
        .as_ref()
        .map(|r| r.version.as_str())
        .filter(|v| !v.is_empty())
    {
        parts.push(v.to_string());
    }
    if let Some(d) = date_label(note) {
        parts.push(d);
    }
    parts.join(" · ")
}

/// Child blocks appended to the daily page for one item.
pub fn notion_blocks(note: &Notification) -> Vec<Value> {
    let item = &note.item;
    let mut blocks = vec![
        json!({
            "object": "block",
            "type": "heading_3",
            "heading_3": { "rich_text": [rich_text(&item.title, Some(&item.link))] }
        }),
        paragraph(&meta_line(note)),
    ];
    if !note.summary.is_empty() {
        blocks.push(paragraph(&note.summary));
    }
    if let Some(r) = note.relevance.as_deref().filter(|r| !r.trim().is_empty()) {
        blocks.push(json!({
            "object": "block",
            "type": "callout",
            "callout": {
                "rich_text": [rich_text(r.trim(), None)],
                "icon": { "type": "emoji", "emoji": "🎯" }
            }
        }));
    }
    blocks.push(json!({ "object": "block", "type": "divider", "divider": {} }));
    blocks
}

/// Column schema for the daily database.
pub fn notion_database_schema() -> Value {
    json!({
        "Title": { "title": {} },
        "Vendor": { "rich_text": {} },
        "Date": { "date": {} },
        "Summary": { "rich_text": {} },
        "URL": { "url": {} },
        "Source": { "rich_text": {} }
    })
}

/// One database row matching [`notion_database_schema`].
pub fn notion_row_properties(note: &Notification) -> Value {
    let item = &note.item;
    let date = item
        .published_at
        .map(|d| json!({ "start": d.format("%Y-%m-%d").to_string() }));
    let url = if item.link.is_empty() {
        Value::Null
    } else {
        Value::String(item.link.clone())
    };
    json!({
        "Title": { "title": [rich_text(&item.title, None)] },
        "Vendor": { "rich_text": [rich_text(&item.vendor_name, None)] },
        "Date": { "date": date },
        "Summary": { "rich_text": [rich_text(&note.summary, None)] },
        "URL": { "url": url },
        "Source": { "rich_text": [rich_text(&item.source_name, None)] }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::releases::release_to_item;
    use crate::ingest::types::{FeedItem, Product, Release, ReleaseDetails, Vendor};
    use chrono::{TimeZone, Utc};

    fn release_note(version: Option<&str>, summary: &str) -> Notification {
        let r = Release {
            id: 9,
            product: Some(Product {
                display_name: Some("Widget".into()),
                vendor: Some(Vendor {
                    display_name: Some("Acme".into()),
                    slug: Some("acme".into()),
                }),
            }),
            release_details: Some(ReleaseDetails {
                release_summary: Some(summary.into()),
                release_number: version.map(str::to_string),
                release_name: None,
            }),
            release_date: Some("2024-01-01".into()),
            created_at: None,
        };
        let item = release_to_item(r, "Releasebot");
        Notification {
            summary: item.summary.clone(),
            item,
            relevance: None,
        }
    }

    fn rss_note(link: &str) -> Notification {
        let item = FeedItem {
            id: "g".into(),
            title: "A < B & C".into(),
            link: link.into(),
            summary: "Body".into(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap()),
            source_name: "Vendor Blog".into(),
            vendor_name: "Vendor".into(),
            kind: FeedKind::Rss,
            release: None,
        };
        Notification {
            summary: item.summary.clone(),
            item,
            relevance: Some("관련도: 높음".into()),
        }
    }

    #[test]
    fn release_message_matches_layout() {
        let msg = slack_message(&release_note(Some("1.2.3"), "Fixes"));
        assert_eq!(msg.text, "Acme Widget 1.2.3 릴리스");
        assert_eq!(msg.blocks[0]["text"]["text"], "🚀 Acme Widget");
        assert_eq!(msg.blocks[1]["text"]["text"], "*버전:* `1.2.3`");
        assert_eq!(msg.blocks[2]["text"]["text"], "Fixes");
        assert_eq!(msg.blocks[3]["elements"][0]["text"], "📅 2024년 1월 1일");
        assert_eq!(msg.blocks.last().unwrap()["type"], "divider");
    }

    #[test]
    fn release_without_version_or_summary() {
        let msg = slack_message(&release_note(None, ""));
        assert_eq!(msg.blocks[1]["text"]["text"], "_버전 정보 없음_");
        assert_eq!(msg.blocks[2]["type"], "context");
        assert_eq!(msg.text, "Acme Widget 릴리스");
    }

    #[test]
    fn long_summary_gets_ellipsis() {
        let mut note = release_note(Some("1"), "x");
        note.summary = "y".repeat(600);
        let msg = slack_message(&note);
        let text = msg.blocks[2]["text"]["text"].as_str().unwrap();
        assert_eq!(text.chars().count(), 503);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn rss_message_links_and_escapes_title() {
        let msg = slack_message(&rss_note("https://x.test/p"));
        assert_eq!(msg.blocks[0]["text"]["text"], "📰 Vendor Blog");
        assert_eq!(
            msg.blocks[1]["text"]["text"],
            "*<https://x.test/p|A &lt; B &amp; C>*"
        );
        assert_eq!(
            msg.blocks[3]["elements"][0]["text"],
            "🏢 Vendor · 📅 2024년 2월 3일"
        );
        assert!(msg.blocks[4]["text"]["text"]
            .as_str()
            .unwrap()
            .contains("관련도: 높음"));
        assert_eq!(msg.text, "Vendor Blog: A < B & C");
    }

    #[test]
    fn notion_blocks_and_row_shape() {
        let note = rss_note("");
        let blocks = notion_blocks(&note);
        assert_eq!(blocks[0]["type"], "heading_3");
        assert!(blocks[0]["heading_3"]["rich_text"][0]["text"]["link"].is_null());
        assert!(blocks.iter().any(|b| b["type"] == "callout"));

        let row = notion_row_properties(&note);
        assert_eq!(row["Date"]["date"]["start"], "2024-02-03");
        assert!(row["URL"]["url"].is_null());
        assert_eq!(row["Source"]["rich_text"][0]["text"]["content"], "Vendor Blog");
        let schema = notion_database_schema();
        for key in row.as_object().unwrap().keys() {
            assert!(schema.get(key).is_some(), "missing column {key}");
        }
    }
}
