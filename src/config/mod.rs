// src/config/mod.rs
pub mod app;
pub mod environment;

pub use app::{
    AppConfig, LlmConfig, NotionConfig, NotionMode, SinkKind, SlackConfig, TranslateConfig,
};
pub use environment::EnvironmentProfile;
