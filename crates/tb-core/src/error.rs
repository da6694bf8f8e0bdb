//! Error types for tracker data handling

use thiserror::Error;

/// A tracker descriptor that cannot enter a dataset.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid domain: '{0}'")]
    InvalidDomain(String),

    #[error("Invalid rule pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported syntax in rule pattern '{pattern}' (alternation and counted repetition are not allowed)")]
    UnsupportedSyntax { pattern: String },
}

/// Errors decoding a compiled dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid dataset JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PslError {
    #[error("Invalid public suffix list: {0}")]
    Parse(String),
}
