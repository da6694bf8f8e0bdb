//! Rule list builder
//!
//! Turns a [`TrackerData`] dataset into an ordered list of [`CompiledRule`]s.
//!
//! The host applies the first rule that matches a request, the same way the
//! detector picks the first matching tracker rule. The list therefore starts
//! with the trusted-site exception, then emits subdomain trackers before
//! their parents. Within a tracker it emits the same-entity exception, each
//! rule in source order preceded by its own exception, and the default
//! action last.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tb_core::filter::{scope_filter, url_filter};
use tb_core::psl::normalize_domain;
use tb_core::{Action, KnownTracker, TrackerData, TrackerRule};

use crate::rule::{CompiledAction, CompiledRule, Trigger};

// =============================================================================
// Options
// =============================================================================

/// A CSS selector to hide on one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHidingRule {
    pub domain: String,
    pub selector: String,
}

impl FromStr for ElementHidingRule {
    type Err = String;

    /// Parse `DOMAIN=SELECTOR`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, selector) = s
            .split_once('=')
            .ok_or_else(|| format!("expected DOMAIN=SELECTOR, got '{s}'"))?;
        let domain = normalize_domain(domain).ok_or_else(|| format!("invalid domain '{domain}'"))?;
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(format!("empty selector for {domain}"));
        }
        Ok(Self {
            domain,
            selector: selector.to_string(),
        })
    }
}

impl fmt::Display for ElementHidingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.domain, self.selector)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Pages on these sites are never blocked
    pub trusted_sites: Vec<String>,
    pub element_hiding: Vec<ElementHidingRule>,
}

// =============================================================================
// Compilation
// =============================================================================

/// Compile a dataset into a host rule list.
///
/// The output order depends only on the dataset and options, so compiling
/// the same input twice yields identical rules.
pub fn compile(data: &TrackerData, options: &CompileOptions) -> Vec<CompiledRule> {
    let mut rules = Vec::new();

    let trusted: BTreeSet<String> = options
        .trusted_sites
        .iter()
        .filter_map(|site| {
            let normalized = normalize_domain(site);
            if normalized.is_none() {
                log::warn!("Ignoring invalid trusted site '{}'", site);
            }
            normalized
        })
        .collect();
    if !trusted.is_empty() {
        rules.push(CompiledRule::new(
            Trigger::new(".*").if_domains(&trusted),
            CompiledAction::IgnorePreviousRules,
        ));
    }

    // Longest domain first, so a subdomain tracker decides before its parent
    let mut trackers: Vec<&KnownTracker> = data.trackers().collect();
    trackers.sort_by(|a, b| {
        label_count(&b.domain)
            .cmp(&label_count(&a.domain))
            .then_with(|| a.domain.cmp(&b.domain))
    });

    for tracker in trackers {
        compile_tracker(data, tracker, &mut rules);
    }

    for hide in &options.element_hiding {
        rules.push(CompiledRule::new(
            Trigger::new(".*").if_domains([&hide.domain]),
            CompiledAction::CssDisplayNone {
                selector: hide.selector.clone(),
            },
        ));
    }

    log::info!(
        "Compiled {} trackers into {} rules",
        data.tracker_count(),
        rules.len()
    );
    rules
}

fn label_count(domain: &str) -> usize {
    domain.split('.').count()
}

fn action_for(action: Action) -> CompiledAction {
    match action {
        Action::Block => CompiledAction::Block,
        Action::Ignore => CompiledAction::IgnorePreviousRules,
    }
}

fn compile_tracker(data: &TrackerData, tracker: &KnownTracker, rules: &mut Vec<CompiledRule>) {
    let scope = scope_filter(&tracker.domain);

    if let Some(owner) = data.owner_of(tracker) {
        if !owner.domains.is_empty() {
            rules.push(CompiledRule::new(
                Trigger::new(scope.clone()).if_domains(&owner.domains),
                CompiledAction::IgnorePreviousRules,
            ));
        }
    }

    for rule in &tracker.rules {
        let filter = url_filter(&tracker.domain, &rule.pattern, rule.options.subdomain_match);

        if let Some(trigger) = exception_trigger(rule, filter.clone()) {
            rules.push(CompiledRule::new(trigger, CompiledAction::IgnorePreviousRules));
        }

        let trigger = Trigger::new(filter)
            .with_types(rule.resource_types)
            .if_domains(&rule.matched_domains);
        rules.push(CompiledRule::new(trigger, action_for(rule.action)));
    }

    rules.push(CompiledRule::new(Trigger::new(scope), action_for(tracker.default_action)));
}

/// The trigger under which a rule's exception applies, or `None` when the
/// exception can never apply together with the rule.
fn exception_trigger(rule: &TrackerRule, filter: String) -> Option<Trigger> {
    let exceptions = &rule.exceptions;
    if exceptions.is_empty() {
        return None;
    }

    let types = match (rule.resource_types.is_empty(), exceptions.resource_types.is_empty()) {
        (_, true) => rule.resource_types,
        (true, false) => exceptions.resource_types,
        (false, false) => {
            let both = rule.resource_types & exceptions.resource_types;
            if both.is_empty() {
                return None;
            }
            both
        }
    };

    let domains = intersect_domains(&rule.matched_domains, &exceptions.domains);
    if domains.is_empty() && !(rule.matched_domains.is_empty() && exceptions.domains.is_empty()) {
        return None;
    }

    Some(Trigger::new(filter).with_types(types).if_domains(&domains))
}

/// Domains covered by both sets, where a domain covers itself and its
/// subdomains. An empty set covers everything.
fn intersect_domains(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    if a.is_empty() {
        return b.clone();
    }
    if b.is_empty() {
        return a.clone();
    }

    let covered = |domain: &str, by: &BTreeSet<String>| {
        by.iter().any(|parent| {
            domain == parent.as_str()
                || (domain.len() > parent.len()
                    && domain.ends_with(parent.as_str())
                    && domain.as_bytes()[domain.len() - parent.len() - 1] == b'.')
        })
    };

    a.iter()
        .filter(|d| covered(d.as_str(), b))
        .chain(b.iter().filter(|d| covered(d.as_str(), a)))
        .cloned()
        .collect()
}
