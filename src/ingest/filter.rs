// src/ingest/filter.rs
//! Newness + recency selection for RSS items. Pure: returns the new seen-id
//! list instead of mutating state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::ingest::types::FeedItem;

/// Per-feed retention for seen ids.
pub const MAX_SEEN_IDS: usize = 500;

/// Outcome of [`select_new`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub items: Vec<FeedItem>,
    pub seen_ids: Vec<String>,
    /// Items dropped because they were undated or older than the window.
    pub stale: usize,
    pub duplicates: usize,
}

/// Keep items that are dated inside the window (when `since` is set), not yet
/// seen, and within `max_per_feed`, in feed order.
pub fn select_new(
    items: Vec<FeedItem>,
    seen_ids: &[String],
    since: Option<DateTime<Utc>>,
    max_per_feed: usize,
) -> Selection {
    let seen: HashSet<&str> = seen_ids.iter().map(String::as_str).collect();
    let mut picked_ids: HashSet<String> = HashSet::new();
    let mut stale = 0usize;
    let mut duplicates = 0usize;
    let mut picked = Vec::new();

    for it in items {
        if let Some(cutoff) = since {
            match it.published_at {
                Some(ts) if ts >= cutoff => {}
                _ => {
                    stale += 1;
                    continue;
                }
            }
        }
        if seen.contains(it.id.as_str()) || picked_ids.contains(&it.id) {
            duplicates += 1;
            continue;
        }
        if picked.len() >= max_per_feed {
            break;
        }
        picked_ids.insert(it.id.clone());
        picked.push(it);
    }

    let new_ids: Vec<String> = picked.iter().map(|i| i.id.clone()).collect();
    Selection {
        seen_ids: merge_seen_ids(seen_ids, &new_ids, MAX_SEEN_IDS),
        items: picked,
        stale,
        duplicates,
    }
}

/// Old ids followed by new ones, keeping only the most recent `cap`.
pub fn merge_seen_ids(old: &[String], new: &[String], cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(old.len() + new.len());
    let mut present: HashSet<&str> = HashSet::new();
    for id in old.iter().chain(new.iter()) {
        if present.insert(id.as_str()) {
            out.push(id.clone());
        }
    }
    if out.len() > cap {
        let excess = out.len() - cap;
        out.drain(0..excess);
    }
    out
}
