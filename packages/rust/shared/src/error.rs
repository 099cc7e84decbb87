//! Error types for mediaqa.
//!
//! Library crates use [`MediaQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all mediaqa operations.
#[derive(Debug, thiserror::Error)]
pub enum MediaQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network failure, invalid URL, or non-success HTTP status while fetching.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A media asset declared a content type that does not match its kind.
    #[error("unsupported content at {url}: declared type {content_type:?}")]
    UnsupportedContent { url: String, content_type: String },

    /// Reasoning or transcription service failure, or unusable output.
    #[error("capability error: {0}")]
    Capability(String),

    /// Markup parsing error. The document parser is permissive and does not
    /// produce this; it exists for callers that validate stricter inputs.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Submission transport failure, non-success status, or unparsable verdict.
    #[error("submission error: {0}")]
    Submission(String),

    /// Flat-file cache error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (incomplete answer set, bad hint ordinal, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MediaQaError>;

impl MediaQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the per-reference failures the media
    /// describer converts into a skip.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_) | Self::UnsupportedContent { .. } | Self::Capability(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MediaQaError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = MediaQaError::UnsupportedContent {
            url: "https://example.com/a.png".into(),
            content_type: "text/html".into(),
        };
        assert!(err.to_string().contains("text/html"));
    }

    #[test]
    fn skippable_errors() {
        assert!(MediaQaError::Fetch("HTTP 404".into()).is_skippable());
        assert!(MediaQaError::Capability("rate limited".into()).is_skippable());
        assert!(!MediaQaError::Submission("HTTP 500".into()).is_skippable());
        assert!(!MediaQaError::validation("bad").is_skippable());
    }
}
