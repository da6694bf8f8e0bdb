//! Atomic snapshot publication
//!
//! Readers grab the current [`Snapshot`] as an `Arc` and keep using it for as
//! long as they like; a refresh builds a whole new detector and swaps it in
//! under a short write lock.

use std::sync::{Arc, PoisonError, RwLock};

use crate::data::TrackerData;
use crate::detection::Detector;

/// One published generation of the detection engine.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    detector: Detector,
}

impl Snapshot {
    pub fn new(generation: u64, detector: Detector) -> Self {
        Self { generation, detector }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn data(&self) -> &TrackerData {
        self.detector.data()
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<Snapshot> {
        // The lock only guards an Arc swap, so a poisoned lock still holds a
        // complete snapshot.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replace the current snapshot and return its generation number.
    pub fn publish(&self, detector: Detector) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation + 1;
        *guard = Arc::new(Snapshot::new(generation, detector));
        log::info!(
            "Published tracker snapshot generation {} ({} trackers)",
            generation,
            guard.data().tracker_count()
        );
        generation
    }
}
