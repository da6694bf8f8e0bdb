//! Tracker catalog
//!
//! Loads one tracker descriptor per file, validates it and resolves its
//! owner against an [`EntityRegistry`].

use std::collections::BTreeMap;
use std::path::Path;

use tb_core::{Entity, KnownTracker, TrackerData};

use crate::corpus::{list_files, read_json};
use crate::error::{DecodeError, LoadError, LoadReport};
use crate::registry::EntityRegistry;

/// Validated trackers plus the entities that own them.
#[derive(Debug, Default)]
pub struct TrackerCatalog {
    trackers: BTreeMap<String, KnownTracker>,
    entities: BTreeMap<String, Entity>,
    unresolved_owners: usize,
    report: LoadReport,
}

impl TrackerCatalog {
    /// Load every regular file under `dir` as a tracker descriptor.
    ///
    /// Malformed and invalid files are skipped and recorded in the report. A
    /// later file for an already-loaded domain replaces the earlier one.
    pub fn load(dir: &Path, registry: &EntityRegistry) -> Result<Self, LoadError> {
        let mut catalog = Self::default();

        for path in list_files(dir, None)? {
            log::debug!("Loading tracker {}", path.display());
            let decoded = read_json::<KnownTracker>(&path)
                .and_then(|tracker| tracker.normalized().map_err(DecodeError::from));
            match decoded {
                Ok(tracker) => {
                    catalog.insert(tracker, registry);
                    catalog.report.loaded += 1;
                }
                Err(error) => catalog.report.record_failure(path, error),
            }
        }

        catalog.resolve_owners(registry);

        log::info!(
            "Loaded {} trackers from {} ({} failed, {} unresolved owners)",
            catalog.trackers.len(),
            dir.display(),
            catalog.report.failed(),
            catalog.unresolved_owners
        );
        Ok(catalog)
    }

    /// Build a catalog from in-memory trackers. Invalid trackers are dropped.
    pub fn from_trackers<I: IntoIterator<Item = KnownTracker>>(trackers: I, registry: &EntityRegistry) -> Self {
        let mut catalog = Self::default();
        for tracker in trackers {
            let domain = tracker.domain.clone();
            match tracker.normalized() {
                Ok(tracker) => {
                    catalog.insert(tracker, registry);
                    catalog.report.loaded += 1;
                }
                Err(e) => log::warn!("Skipping tracker {}: {}", domain, e),
            }
        }
        catalog.resolve_owners(registry);
        catalog
    }

    fn insert(&mut self, mut tracker: KnownTracker, registry: &EntityRegistry) {
        if let Some(entity) = tracker.owner_entity_name.as_deref().and_then(|name| registry.lookup(name)) {
            tracker.owner_entity_name = Some(entity.name.clone());
        }
        let domain = tracker.domain.clone();
        if self.trackers.insert(domain.clone(), tracker).is_some() {
            log::warn!("Tracker {} defined more than once; keeping the later definition", domain);
        }
    }

    /// Collect the entities owning surviving trackers and count the owners
    /// that resolve to nothing.
    fn resolve_owners(&mut self, registry: &EntityRegistry) {
        self.entities.clear();
        self.unresolved_owners = 0;
        for tracker in self.trackers.values() {
            let Some(ref owner) = tracker.owner_entity_name else {
                continue;
            };
            match registry.lookup(owner) {
                Some(entity) => {
                    self.entities.entry(entity.name.clone()).or_insert_with(|| entity.clone());
                }
                None => {
                    log::debug!("Tracker {} has unknown owner '{}'", tracker.domain, owner);
                    self.unresolved_owners += 1;
                }
            }
        }
    }

    pub fn trackers(&self) -> impl Iterator<Item = &KnownTracker> {
        self.trackers.values()
    }

    /// Entities owning at least one loaded tracker.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn tracker(&self, domain: &str) -> Option<&KnownTracker> {
        self.trackers.get(domain)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn unresolved_owners(&self) -> usize {
        self.unresolved_owners
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn take_report(&mut self) -> LoadReport {
        std::mem::take(&mut self.report)
    }

    /// Aggregate into an immutable dataset.
    pub fn into_data(self) -> TrackerData {
        TrackerData::build(self.trackers.into_values(), self.entities.into_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tb_core::Action;

    fn registry() -> EntityRegistry {
        EntityRegistry::from_entities(vec![
            Entity::new("Tracker Co", ["tracker.example", "tracker-news.example"]),
            Entity::new("Idle Co", ["idle.example"]),
        ])
    }

    fn write_tracker(dir: &Path, file: &str, domain: &str, owner: Option<&str>, default: &str) {
        let owner = owner.map(|o| format!(r#", "owner": "{o}""#)).unwrap_or_default();
        fs::write(
            dir.join(file),
            format!(r#"{{"domain": "{domain}", "default": "{default}"{owner}}}"#),
        )
        .unwrap();
    }

    #[test]
    fn one_malformed_file_among_a_hundred() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..99 {
            write_tracker(dir.path(), &format!("t{i:03}.json"), &format!("t{i}.example"), None, "block");
        }
        fs::write(dir.path().join("t099.json"), r#"{"domain": "broken.example", "rules": ["#).unwrap();

        let catalog = TrackerCatalog::load(dir.path(), &registry()).unwrap();
        assert_eq!(catalog.len(), 99);
        assert_eq!(catalog.report().loaded, 99);
        assert_eq!(catalog.report().failed(), 1);
        assert!(catalog.report().failures[0].path.ends_with("t099.json"));

        let data = catalog.into_data();
        assert_eq!(data.tracker_count(), 99);
        assert!(data.tracker("broken.example").is_none());
    }

    #[test]
    fn invalid_trackers_are_counted_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad-pattern.json"),
            r#"{"domain": "t.example", "rules": [{"pattern": "(open"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("bad-domain.json"), r#"{"domain": "no spaces allowed"}"#).unwrap();
        fs::write(
            dir.path().join("bad-type.json"),
            r#"{"domain": "u.example", "rules": [{"pattern": "", "types": ["hologram"]}]}"#,
        )
        .unwrap();

        let catalog = TrackerCatalog::load(dir.path(), &registry()).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.report().failed(), 3);
        assert!(catalog
            .report()
            .failures
            .iter()
            .any(|f| matches!(f.error, DecodeError::Invalid(_))));
    }

    #[test]
    fn resolves_owners_and_keeps_live_entities() {
        let dir = tempfile::tempdir().unwrap();
        write_tracker(dir.path(), "a.json", "tracker.example", Some("Tracker Co"), "block");
        write_tracker(dir.path(), "b.json", "cdn.example", Some("Ghost Corp"), "ignore");

        let catalog = TrackerCatalog::load(dir.path(), &registry()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.unresolved_owners(), 1);
        let names: Vec<_> = catalog.entities().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Tracker Co"]);

        let data = catalog.into_data();
        assert_eq!(data.entity_count(), 1);
        assert!(data.owner_of(data.tracker("cdn.example").unwrap()).is_none());
    }

    #[test]
    fn owner_names_are_canonicalized() {
        let registry = EntityRegistry::from_entities(vec![Entity::new("Yahoo! Inc", ["yahoo.example"])]);
        let catalog = TrackerCatalog::from_trackers(
            vec![KnownTracker::new("ads.yahoo.example", Action::Block).with_owner("Yahoo Inc")],
            &registry,
        );
        let tracker = catalog.tracker("ads.yahoo.example").unwrap();
        assert_eq!(tracker.owner_entity_name.as_deref(), Some("Yahoo! Inc"));
    }

    #[test]
    fn later_file_wins_for_duplicate_domains() {
        let dir = tempfile::tempdir().unwrap();
        write_tracker(dir.path(), "1.json", "dup.example", Some("Tracker Co"), "block");
        write_tracker(dir.path(), "2.json", "dup.example", Some("Idle Co"), "ignore");

        let catalog = TrackerCatalog::load(dir.path(), &registry()).unwrap();
        assert_eq!(catalog.len(), 1);
        let tracker = catalog.tracker("dup.example").unwrap();
        assert_eq!(tracker.default_action, Action::Ignore);
        assert_eq!(tracker.owner_entity_name.as_deref(), Some("Idle Co"));

        // The replaced record's owner no longer counts as live
        let names: Vec<_> = catalog.entities().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Idle Co"]);
    }
}
