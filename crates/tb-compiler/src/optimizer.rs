//! Rule list optimizer
//!
//! Removes rules that can never decide a request.

use std::collections::HashSet;

use crate::rule::CompiledRule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Remove exact duplicate rules, keeping the first copy of each.
///
/// The host stops at the first matching rule, so a later copy is never
/// reached.
pub fn optimize_rules(rules: &mut Vec<CompiledRule>) -> OptimizeStats {
    let before = rules.len();

    let mut seen: HashSet<CompiledRule> = HashSet::with_capacity(before);
    rules.retain(|rule| seen.insert(rule.clone()));

    let after = rules.len();
    if before != after {
        log::debug!("Removed {} duplicate rules", before - after);
    }

    OptimizeStats {
        before,
        after,
        deduped: before - after,
    }
}
