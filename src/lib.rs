// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod enrich;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod runner;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::ingest::normalize_text as decode;
pub use crate::ingest::rss::parse;
pub use crate::notify::{Notification, Notifier, NotifierMux};
pub use crate::runner::{run, Pipeline, RunOptions, RunSummary};
pub use crate::state::RunState;
