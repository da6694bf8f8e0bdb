//! Error and report types for corpus loading and output

use std::fmt;
use std::io;
use std::path::PathBuf;

use tb_core::{DatasetError, TrackerError};
use thiserror::Error;

/// A failure that aborts the operation it happened in.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to enumerate {path}: {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Why a single descriptor file was skipped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unreadable: {0}")]
    Read(#[from] io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid tracker: {0}")]
    Invalid(#[from] TrackerError),
}

/// One skipped file.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: DecodeError,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Outcome of loading a directory of descriptor files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub(crate) fn record_failure(&mut self, path: PathBuf, error: DecodeError) {
        log::warn!("Skipping {}: {}", path.display(), error);
        self.failures.push(LoadFailure { path, error });
    }
}
