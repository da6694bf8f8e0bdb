//! Entity registry
//!
//! Loads one entity descriptor per `*.json` file and resolves tracker owner
//! names to entities.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::de::Error as _;
use tb_core::Entity;

use crate::corpus::{list_files, read_json};
use crate::error::{DecodeError, LoadError, LoadReport};

/// Owner names and file stems are compared with these characters removed.
fn sanitize(name: &str) -> String {
    name.chars().filter(|&c| c != '/' && c != '!').collect()
}

/// Entities keyed by name.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Entity>,
    by_key: HashMap<String, String>,
    report: LoadReport,
}

impl EntityRegistry {
    /// Load every `*.json` file under `dir` as an entity.
    ///
    /// Files that fail to decode are skipped and recorded in the report.
    pub fn load_all(dir: &Path) -> Result<Self, LoadError> {
        let mut registry = Self::default();

        for path in list_files(dir, Some("json"))? {
            log::debug!("Loading entity {}", path.display());
            match read_json::<Entity>(&path).and_then(require_name) {
                Ok(entity) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        registry.by_key.insert(sanitize(stem), entity.name.clone());
                    }
                    registry.insert(entity);
                    registry.report.loaded += 1;
                }
                Err(error) => registry.report.record_failure(path, error),
            }
        }

        log::info!(
            "Loaded {} entities from {} ({} failed)",
            registry.entities.len(),
            dir.display(),
            registry.report.failed()
        );
        Ok(registry)
    }

    /// Build a registry from in-memory entities.
    pub fn from_entities<I: IntoIterator<Item = Entity>>(entities: I) -> Self {
        let mut registry = Self::default();
        for entity in entities.into_iter().filter_map(Entity::normalized) {
            registry.insert(entity);
            registry.report.loaded += 1;
        }
        registry
    }

    fn insert(&mut self, entity: Entity) {
        self.by_key.insert(sanitize(&entity.name), entity.name.clone());
        if let Some(previous) = self.entities.insert(entity.name.clone(), entity) {
            log::warn!("Entity '{}' defined more than once; keeping the later definition", previous.name);
        }
    }

    /// Resolve an owner name: exact name first, then the sanitized name
    /// against file stems.
    pub fn lookup(&self, name: &str) -> Option<&Entity> {
        let name = name.trim();
        self.entities.get(name).or_else(|| {
            self.by_key
                .get(&sanitize(name))
                .and_then(|canonical| self.entities.get(canonical))
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn into_report(self) -> LoadReport {
        self.report
    }
}

fn require_name(entity: Entity) -> Result<Entity, DecodeError> {
    entity
        .normalized()
        .ok_or_else(|| DecodeError::Json(serde_json::Error::custom("entity has an empty name")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_entities_and_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Example Co.json"),
            r#"{"name": "Example Co", "domains": ["example.com", "example-cdn.com"]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("empty-name.json"), r#"{"name": "  "}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = EntityRegistry::load_all(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.report().loaded, 1);
        assert_eq!(registry.report().failed(), 2);
        assert_eq!(registry.lookup("Example Co").unwrap().domains.len(), 2);
    }

    #[test]
    fn later_file_wins_for_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"name": "Dup", "domains": ["first.example"]}"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"name": "Dup", "domains": ["second.example"]}"#).unwrap();

        let registry = EntityRegistry::load_all(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        let entity = registry.lookup("Dup").unwrap();
        assert!(entity.domains.contains("second.example"));
        assert!(!entity.domains.contains("first.example"));
    }

    #[test]
    fn lookup_falls_back_to_sanitized_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Yahoo Inc.json"),
            r#"{"name": "Yahoo! Inc.", "domains": ["yahoo.com"]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("AT&T Services.json"),
            r#"{"name": "AT&T/Services", "domains": ["att.com"]}"#,
        )
        .unwrap();

        let registry = EntityRegistry::load_all(dir.path()).unwrap();
        assert_eq!(registry.lookup("Yahoo! Inc").unwrap().name, "Yahoo! Inc.");
        assert_eq!(registry.lookup("AT&T/Services").unwrap().name, "AT&T/Services");
        assert!(registry.lookup("Unknown Corp").is_none());
    }

    #[test]
    fn in_memory_registry() {
        let registry = EntityRegistry::from_entities(vec![
            Entity::new("A", ["a.example"]),
            Entity::new("A", ["a2.example"]),
            Entity::new("Bang!", ["b.example"]),
        ]);
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("A").unwrap().domains.contains("a2.example"));
        assert_eq!(registry.lookup("Bang").unwrap().name, "Bang!");
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EntityRegistry::load_all(&dir.path().join("nope")),
            Err(LoadError::Enumerate { .. })
        ));
    }
}
