// src/ingest/mod.rs
pub mod config;
pub mod dates;
pub mod filter;
pub mod releases;
pub mod rss;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Display cap for item bodies, in characters.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// One-time metrics registration (so series show up in the textfile dump).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "notifier_items_fetched_total",
            "Items parsed from all sources."
        );
        describe_counter!(
            "notifier_items_new_total",
            "Items kept after dedup and recency filtering."
        );
        describe_counter!(
            "notifier_source_errors_total",
            "Source fetch/parse errors."
        );
        describe_counter!("notifier_sink_errors_total", "Failed sink sends.");
        describe_counter!(
            "notifier_translations_total",
            "Summaries that came back translated."
        );
        describe_histogram!("notifier_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("notifier_last_run_ts", "Unix ts when the last run finished.");
    });
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Decode HTML entities and strip markup into readable plain text.
///
/// Entities are decoded *before* tags are stripped, so an encoded
/// `&lt;b&gt;` ends up removed like a real tag. Never fails.
pub fn normalize_text(s: &str) -> String {
    static RE_SCRIPT: OnceCell<Regex> = OnceCell::new();
    static RE_STYLE: OnceCell<Regex> = OnceCell::new();
    static RE_BLOCK_END: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_HSPACE: OnceCell<Regex> = OnceCell::new();
    static RE_NEWLINES: OnceCell<Regex> = OnceCell::new();

    // 1) CDATA wrapper
    let mut body = s.trim();
    if let Some(rest) = body.strip_prefix("<![CDATA[") {
        body = rest.strip_suffix("]]>").unwrap_or(rest);
    }
    if body.is_empty() {
        return String::new();
    }

    // 2) Entities
    let pre = body.replace("&nbsp;", " ");
    let mut out = html_escape::decode_html_entities(&pre).replace('\u{00A0}', " ");

    // 3) script/style blocks with their content
    out = re(&RE_SCRIPT, r"(?is)<script\b[^>]*>.*?</script\s*>")
        .replace_all(&out, "")
        .into_owned();
    out = re(&RE_STYLE, r"(?is)<style\b[^>]*>.*?</style\s*>")
        .replace_all(&out, "")
        .into_owned();

    // 4) Block-level breaks
    out = re(
        &RE_BLOCK_END,
        r"(?i)<br\s*/?>|</(?:p|div|li|h[1-6]|tr)\s*>",
    )
    .replace_all(&out, "\n")
    .into_owned();

    // 5) Remaining tags
    out = re(&RE_TAGS, r"(?s)<[^>]+>").replace_all(&out, "").into_owned();

    // 6) Whitespace
    let out = out.replace("\r\n", "\n").replace('\r', "\n");
    let hspace = re(&RE_HSPACE, r"[ \t]+");
    let lines: Vec<String> = out
        .split('\n')
        .map(|line| hspace.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    re(&RE_NEWLINES, r"\n{3,}")
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Cut to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
