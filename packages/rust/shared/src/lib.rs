//! Shared types, error model, and configuration for mediaqa.
//!
//! This crate is the foundation depended on by all other mediaqa crates.
//! It provides:
//! - [`MediaQaError`]: the unified error type
//! - Domain types ([`MediaReference`], [`CacheKey`], [`Question`], [`AnswerSet`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, LlmConfig, LlmSettings, PipelineConfig, QuestionHint, TaskConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_credential,
};
pub use error::{MediaQaError, Result};
pub use types::{
    Answer, AnswerSet, CacheEntry, CacheKey, MediaDescription, MediaKind, MediaReference,
    Question, ordinal_key, parse_questions,
};
