// src/enrich/mod.rs
//! Best-effort enrichment of items before they are sent.

pub mod annotate;
pub mod llm;
pub mod translate;

pub use annotate::RelevanceAnnotator;
pub use llm::{build_generator, DynGenerator, TextGenerator};
pub use translate::Translator;
