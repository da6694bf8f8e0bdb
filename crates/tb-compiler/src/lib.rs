//! TrackerBlock Rule Compiler
//!
//! This crate loads tracker and entity descriptor directories, aggregates
//! them into a [`TrackerData`] dataset and compiles that dataset into a
//! content blocker rule list.

pub mod builder;
pub mod catalog;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod optimizer;
pub mod output;
pub mod registry;
pub mod rule;

use std::path::Path;

use tb_core::TrackerData;

pub use builder::{compile, CompileOptions, ElementHidingRule};
pub use catalog::TrackerCatalog;
pub use error::{DecodeError, LoadError, LoadFailure, LoadReport};
pub use evaluate::RuleEvaluator;
pub use optimizer::{optimize_rules, OptimizeStats};
pub use registry::EntityRegistry;
pub use rule::{CompiledAction, CompiledRule, Trigger};

/// Everything produced by one compilation pass.
#[derive(Debug)]
pub struct Compilation {
    pub data: TrackerData,
    pub rules: Vec<CompiledRule>,
    pub entity_report: LoadReport,
    pub tracker_report: LoadReport,
    pub optimize: OptimizeStats,
}

/// Load both descriptor directories, aggregate and compile.
///
/// Fails only when a directory cannot be enumerated; per-file problems end up
/// in the reports.
pub fn compile_corpus(trackers_dir: &Path, entities_dir: &Path, options: &CompileOptions) -> Result<Compilation, LoadError> {
    let registry = EntityRegistry::load_all(entities_dir)?;
    let mut catalog = TrackerCatalog::load(trackers_dir, &registry)?;
    let tracker_report = catalog.take_report();

    let data = catalog.into_data();
    let mut rules = compile(&data, options);
    let optimize = optimize_rules(&mut rules);

    Ok(Compilation {
        data,
        rules,
        entity_report: registry.into_report(),
        tracker_report,
        optimize,
    })
}
