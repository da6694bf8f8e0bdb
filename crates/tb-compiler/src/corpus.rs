//! Descriptor directory traversal
//!
//! Files are visited in sorted path order. Merges downstream are
//! last-write-wins, so this order decides which duplicate survives.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use walkdir::WalkDir;

use crate::error::{DecodeError, LoadError};

/// List regular files under `dir`, recursively, in sorted path order.
///
/// With `extension`, only files whose extension matches (case-insensitive)
/// are listed. Any traversal error is fatal.
pub fn list_files(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|source| LoadError::Enumerate {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let wanted = match extension {
            Some(ext) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            None => true,
        };
        if wanted {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read and decode one JSON descriptor file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DecodeError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
