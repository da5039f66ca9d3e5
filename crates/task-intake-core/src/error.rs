//! Error types for task ingestion.
//!
//! Every failure that reaches a caller is a [`ValidationFailure`]: a
//! human-readable message with no recovery path. Per-file reader errors
//! ([`ReadError`]) are converted into a `ValidationFailure` that names the
//! originating file before they leave the normalizer.

use std::fmt::Display;

/// The single caller-visible failure kind of the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationFailure {
    message: String,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wraps a per-file error with the name of the file it came from.
    pub fn parse(file_name: &str, cause: impl Display) -> Self {
        Self::new(format!("Failed to parse input file {}: {}", file_name, cause))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while extracting tasks from a single file body.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Delimited text could not be tokenized.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The body is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The body is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The body parsed but its content cannot become tasks.
    #[error("{0}")]
    Invalid(String),

    /// The file body could not be read from storage.
    #[error("{0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ValidationFailure>;
