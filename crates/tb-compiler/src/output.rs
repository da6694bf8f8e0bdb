//! Dataset and rule list files

use std::fs;
use std::path::Path;

use tb_core::TrackerData;

use crate::error::LoadError;
use crate::rule::CompiledRule;

fn write_file(path: &Path, contents: &str) -> Result<(), LoadError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LoadError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| LoadError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the dataset JSON, creating parent directories as needed.
pub fn write_dataset(path: &Path, data: &TrackerData) -> Result<(), LoadError> {
    let json = data.to_json()?;
    write_file(path, &json)?;
    log::info!("Wrote dataset with {} trackers to {}", data.tracker_count(), path.display());
    Ok(())
}

pub fn read_dataset(path: &Path) -> Result<TrackerData, LoadError> {
    let text = read_file(path)?;
    Ok(TrackerData::from_json(&text)?)
}

/// Write a compiled rule list as a pretty-printed JSON array.
pub fn write_rules(path: &Path, rules: &[CompiledRule]) -> Result<(), LoadError> {
    let json = serde_json::to_string_pretty(rules)?;
    write_file(path, &json)?;
    log::info!("Wrote {} rules to {}", rules.len(), path.display());
    Ok(())
}

pub fn read_rules(path: &Path) -> Result<Vec<CompiledRule>, LoadError> {
    let text = read_file(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{compile, CompileOptions};
    use tb_core::{Action, Entity, KnownTracker};

    fn data() -> TrackerData {
        TrackerData::build(
            vec![KnownTracker::new("t.example", Action::Block).with_owner("T")],
            vec![Entity::new("T", ["t.example"])],
        )
    }

    #[test]
    fn dataset_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/dataset.json");
        write_dataset(&path, &data()).unwrap();
        assert_eq!(read_dataset(&path).unwrap(), data());
    }

    #[test]
    fn rules_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let rules = compile(&data(), &CompileOptions::default());
        write_rules(&path, &rules).unwrap();
        assert_eq!(read_rules(&path).unwrap(), rules);
    }

    #[test]
    fn errors_name_their_site() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_dataset(&dir.path().join("missing.json")), Err(LoadError::Read { .. })));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "[1, 2").unwrap();
        assert!(matches!(read_dataset(&garbage), Err(LoadError::Dataset(_))));
        assert!(matches!(read_rules(&garbage), Err(LoadError::Serialize(_))));

        // A directory cannot be written as a file
        assert!(matches!(write_rules(dir.path(), &[]), Err(LoadError::Write { .. })));
    }
}
