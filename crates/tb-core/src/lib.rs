//! TrackerBlock Core Library
//!
//! This crate provides the tracker data model and the detection engine for
//! TrackerBlock.
//!
//! # Architecture
//!
//! Tracker and entity records are merged into an immutable [`TrackerData`]
//! dataset. A [`Detector`] compiles the rule patterns of that dataset once
//! and then classifies requests with a host suffix walk followed by ordered
//! rule evaluation. The rule compiler in `tb-compiler` emits URL filters
//! through the same [`filter`] functions, so the compiled rule list and the
//! detector agree on what each rule matches.
//!
//! # Modules
//!
//! - `types`: Entities, trackers, rules, resource types
//! - `data`: Dataset aggregation and the dataset JSON file
//! - `detection`: Request classification
//! - `filter`: URL filter construction
//! - `psl`: Public Suffix List for eTLD+1 extraction
//! - `store`: Atomic snapshot publication
//! - `url`: Fast URL parsing
//! - `error`: Error types

pub mod data;
pub mod detection;
pub mod error;
pub mod filter;
pub mod psl;
pub mod store;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use data::{BuildStats, TrackerData};
pub use detection::{Classification, Detector, Reason};
pub use error::{DatasetError, PslError, TrackerError};
pub use psl::SuffixList;
pub use store::{Snapshot, SnapshotStore};
pub use types::{Action, Entity, KnownTracker, ResourceType, RuleExceptions, RuleOptions, TrackerRule};
