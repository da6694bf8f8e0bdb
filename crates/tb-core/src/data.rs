//! Aggregated tracker dataset
//!
//! [`TrackerData`] joins trackers with the entities that own them and keeps
//! the derived domain index consistent with both. Once built it is immutable;
//! refreshes build a new value and publish it through
//! [`SnapshotStore`](crate::store::SnapshotStore).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::types::{Entity, KnownTracker};

// =============================================================================
// Build Statistics
// =============================================================================

/// Counters collected while building a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub trackers: usize,
    pub entities: usize,
    /// Tracker records replaced by a later record for the same domain
    pub duplicate_trackers: usize,
    /// Entity records replaced by a later record with the same name
    pub duplicate_entities: usize,
    pub invalid_trackers: usize,
    pub invalid_entities: usize,
    /// Trackers whose owner name matches no entity
    pub unresolved_owners: usize,
    /// Entities dropped because no tracker references them
    pub unreferenced_entities: usize,
}

// =============================================================================
// Tracker Data
// =============================================================================

/// Immutable tracker dataset keyed by tracker domain and entity name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerData {
    trackers: BTreeMap<String, KnownTracker>,
    entities: BTreeMap<String, Entity>,
    entity_by_domain: BTreeMap<String, String>,
}

/// On-disk dataset layout, borrowed for writing.
#[derive(Serialize)]
struct DatasetRef<'a> {
    trackers: &'a BTreeMap<String, KnownTracker>,
    entities: Vec<&'a Entity>,
}

/// On-disk dataset layout, owned for reading.
#[derive(Deserialize)]
struct DatasetFile {
    #[serde(default)]
    trackers: BTreeMap<String, KnownTracker>,
    #[serde(default)]
    entities: Vec<Entity>,
}

impl TrackerData {
    /// Build a dataset from tracker and entity records.
    ///
    /// Later records win over earlier ones with the same key. Invalid
    /// trackers are dropped, and only entities that own at least one tracker
    /// are kept.
    pub fn build<T, E>(trackers: T, entities: E) -> Self
    where
        T: IntoIterator<Item = KnownTracker>,
        E: IntoIterator<Item = Entity>,
    {
        Self::build_with_stats(trackers, entities).0
    }

    pub fn build_with_stats<T, E>(trackers: T, entities: E) -> (Self, BuildStats)
    where
        T: IntoIterator<Item = KnownTracker>,
        E: IntoIterator<Item = Entity>,
    {
        let mut stats = BuildStats::default();

        let mut all_entities: BTreeMap<String, Entity> = BTreeMap::new();
        for entity in entities {
            let Some(entity) = entity.normalized() else {
                stats.invalid_entities += 1;
                log::warn!("Skipping entity with empty name");
                continue;
            };
            if all_entities.insert(entity.name.clone(), entity).is_some() {
                stats.duplicate_entities += 1;
            }
        }

        let mut by_domain: BTreeMap<String, KnownTracker> = BTreeMap::new();
        for tracker in trackers {
            let domain = tracker.domain.clone();
            match tracker.normalized() {
                Ok(tracker) => {
                    if let Some(previous) = by_domain.insert(tracker.domain.clone(), tracker) {
                        log::debug!("Tracker {} replaced by a later record", previous.domain);
                        stats.duplicate_trackers += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Skipping tracker {}: {}", domain, e);
                    stats.invalid_trackers += 1;
                }
            }
        }

        let mut live: BTreeSet<&str> = BTreeSet::new();
        for tracker in by_domain.values() {
            if let Some(ref owner) = tracker.owner_entity_name {
                if all_entities.contains_key(owner) {
                    live.insert(owner.as_str());
                } else {
                    log::debug!("Tracker {} has unknown owner '{}'", tracker.domain, owner);
                    stats.unresolved_owners += 1;
                }
            }
        }

        let live: BTreeSet<String> = live.into_iter().map(str::to_string).collect();
        let total_entities = all_entities.len();
        all_entities.retain(|name, _| live.contains(name));
        stats.unreferenced_entities = total_entities - all_entities.len();

        let entity_by_domain = index_entity_domains(&all_entities);

        stats.trackers = by_domain.len();
        stats.entities = all_entities.len();

        let data = Self {
            trackers: by_domain,
            entities: all_entities,
            entity_by_domain,
        };
        (data, stats)
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Trackers in domain order.
    pub fn trackers(&self) -> impl Iterator<Item = &KnownTracker> {
        self.trackers.values()
    }

    /// Entities in name order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn tracker(&self, domain: &str) -> Option<&KnownTracker> {
        self.trackers.get(domain)
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// The entity that owns a tracker, if it is part of this dataset.
    pub fn owner_of(&self, tracker: &KnownTracker) -> Option<&Entity> {
        tracker
            .owner_entity_name
            .as_deref()
            .and_then(|name| self.entities.get(name))
    }

    /// The entity listing exactly this domain among its properties.
    pub fn entity_for_domain(&self, domain: &str) -> Option<&Entity> {
        self.entity_by_domain
            .get(domain)
            .and_then(|name| self.entities.get(name))
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize to the dataset JSON layout: a tracker map keyed by domain and
    /// an entity list sorted by name.
    pub fn to_json(&self) -> Result<String, DatasetError> {
        let file = DatasetRef {
            trackers: &self.trackers,
            entities: self.entities.values().collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parse a dataset and rebuild its indexes.
    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        let file: DatasetFile = serde_json::from_str(text)?;
        let (data, stats) = Self::build_with_stats(file.trackers.into_values(), file.entities);
        if stats.invalid_trackers > 0 {
            log::warn!("Dataset contained {} invalid trackers", stats.invalid_trackers);
        }
        Ok(data)
    }
}

/// Map every entity domain to its owner. When two entities list the same
/// domain the one whose name sorts last keeps it.
fn index_entity_domains(entities: &BTreeMap<String, Entity>) -> BTreeMap<String, String> {
    let mut index: BTreeMap<String, String> = BTreeMap::new();
    for entity in entities.values() {
        for domain in &entity.domains {
            if let Some(previous) = index.insert(domain.clone(), entity.name.clone()) {
                log::warn!(
                    "Domain {} is listed by both '{}' and '{}'; using '{}'",
                    domain,
                    previous,
                    entity.name,
                    entity.name
                );
            }
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, TrackerRule};

    fn sample() -> TrackerData {
        TrackerData::build(
            vec![
                KnownTracker::new("tracker.example", Action::Block).with_owner("Tracker Co"),
                KnownTracker::new("cdn.example", Action::Ignore).with_owner("Nobody Inc"),
                KnownTracker::new("orphan.example", Action::Block),
            ],
            vec![
                Entity::new("Tracker Co", ["tracker.example", "tracker-site.example"]),
                Entity::new("Unused Co", ["unused.example"]),
            ],
        )
    }

    #[test]
    fn test_build_keeps_only_live_entities() {
        let data = sample();
        assert_eq!(data.tracker_count(), 3);
        assert_eq!(data.entity_count(), 1);
        assert!(data.entity("Unused Co").is_none());

        let tracker = data.tracker("tracker.example").unwrap();
        assert_eq!(data.owner_of(tracker).unwrap().name, "Tracker Co");

        let unresolved = data.tracker("cdn.example").unwrap();
        assert!(data.owner_of(unresolved).is_none());
        assert_eq!(unresolved.owner_entity_name.as_deref(), Some("Nobody Inc"));
    }

    #[test]
    fn test_build_stats() {
        let (_, stats) = TrackerData::build_with_stats(
            vec![
                KnownTracker::new("a.example", Action::Block).with_owner("A"),
                KnownTracker::new("a.example", Action::Ignore).with_owner("A"),
                KnownTracker::new("bad host", Action::Block),
                KnownTracker::new("b.example", Action::Block).with_owner("Missing"),
            ],
            vec![Entity::new("A", ["a.example"]), Entity::new("B", ["b.example"])],
        );
        assert_eq!(stats.trackers, 2);
        assert_eq!(stats.duplicate_trackers, 1);
        assert_eq!(stats.invalid_trackers, 1);
        assert_eq!(stats.unresolved_owners, 1);
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.unreferenced_entities, 1);
    }

    #[test]
    fn test_duplicate_tracker_last_wins() {
        let data = TrackerData::build(
            vec![
                KnownTracker::new("t.example", Action::Block),
                KnownTracker::new("T.Example", Action::Ignore),
            ],
            Vec::<Entity>::new(),
        );
        assert_eq!(data.tracker_count(), 1);
        assert_eq!(data.tracker("t.example").unwrap().default_action, Action::Ignore);
    }

    #[test]
    fn test_entity_domain_index() {
        let data = sample();
        assert_eq!(data.entity_for_domain("tracker-site.example").unwrap().name, "Tracker Co");
        assert!(data.entity_for_domain("unused.example").is_none());
        assert!(data.entity_for_domain("sub.tracker-site.example").is_none());
    }

    #[test]
    fn test_conflicting_entity_domain_goes_to_last_name() {
        let data = TrackerData::build(
            vec![
                KnownTracker::new("a.example", Action::Block).with_owner("Alpha"),
                KnownTracker::new("b.example", Action::Block).with_owner("Beta"),
            ],
            vec![
                Entity::new("Beta", ["shared.example"]),
                Entity::new("Alpha", ["shared.example"]),
            ],
        );
        assert_eq!(data.entity_for_domain("shared.example").unwrap().name, "Beta");
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let data = sample();
        let rebuilt = TrackerData::build(data.trackers().cloned(), data.entities().cloned());
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_json_round_trip() {
        let data = TrackerData::build(
            vec![KnownTracker::new("t.example", Action::Block)
                .with_owner("T Co")
                .with_rule(TrackerRule::new("collect", Action::Block))],
            vec![Entity::new("T Co", ["t.example", "t-site.example"])],
        );
        let json = data.to_json().unwrap();
        let parsed = TrackerData::from_json(&json).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(parsed.entity("T Co").unwrap().domains.len(), 2);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(TrackerData::from_json("{\"trackers\": 5}").is_err());
        assert!(TrackerData::from_json("not json").is_err());
    }

    #[test]
    fn test_empty_dataset() {
        let data = TrackerData::build(Vec::<KnownTracker>::new(), Vec::<Entity>::new());
        assert!(data.is_empty());
        assert!(data.to_json().unwrap().contains("\"trackers\": {}"));
    }
}
