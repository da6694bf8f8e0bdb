//! Detection Engine
//!
//! Classifies a `(resource URL, page URL, resource type)` triple against a
//! [`TrackerData`] snapshot. Every request goes through here, so the rule
//! regexes are compiled once per tracker when the detector is built and the
//! lookup itself is a host suffix walk over hash maps.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;

use crate::data::TrackerData;
use crate::filter::{compile_filter, url_filter};
use crate::psl::{normalize_domain, SuffixList};
use crate::types::{Action, Entity, KnownTracker, ResourceType, TrackerRule};
use crate::url::{host_of, normalize_resource_url};

// =============================================================================
// Classification
// =============================================================================

/// Why a request received its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rule", rename_all = "snake_case")]
pub enum Reason {
    /// The page is on the trusted site list
    TrustedSite,
    /// The tracker and the page belong to the same entity
    SameEntity,
    /// The rule at this index matched
    Rule(usize),
    /// The rule at this index matched but its exception applied
    RuleException(usize),
    /// No rule matched; the tracker's default action applies
    Default,
}

/// Result of classifying a request that hit a known tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub action: Action,
    pub matched_tracker_domain: String,
    pub matched_entity: Option<Entity>,
    pub reason: Reason,
}

// =============================================================================
// Detector
// =============================================================================

/// The tracker detection engine.
#[derive(Debug)]
pub struct Detector {
    data: Arc<TrackerData>,
    /// URL filter per rule, indexed like `KnownTracker::rules`
    filters: HashMap<String, Vec<Option<Regex>>>,
    suffixes: SuffixList,
    trusted_sites: HashSet<String>,
}

impl Detector {
    /// Create a detector over a dataset, using the heuristic suffix list.
    pub fn new(data: Arc<TrackerData>) -> Self {
        let filters = data
            .trackers()
            .map(|tracker| (tracker.domain.clone(), compile_rules(tracker)))
            .collect();

        Self {
            data,
            filters,
            suffixes: SuffixList::heuristic(),
            trusted_sites: HashSet::new(),
        }
    }

    /// Replace the suffix list used for host suffix walks.
    pub fn with_suffix_list(mut self, suffixes: SuffixList) -> Self {
        self.suffixes = suffixes;
        self
    }

    /// Add a site to the trusted list (bypass all blocking).
    pub fn add_trusted_site(&mut self, site: &str) {
        match normalize_domain(site) {
            Some(site) => {
                self.trusted_sites.insert(site);
            }
            None => log::warn!("Ignoring invalid trusted site '{}'", site),
        }
    }

    /// Remove a site from the trusted list.
    pub fn remove_trusted_site(&mut self, site: &str) {
        if let Some(site) = normalize_domain(site) {
            self.trusted_sites.remove(&site);
        }
    }

    pub fn trusted_sites(&self) -> BTreeSet<&str> {
        self.trusted_sites.iter().map(String::as_str).collect()
    }

    pub fn data(&self) -> &Arc<TrackerData> {
        &self.data
    }

    pub fn suffixes(&self) -> &SuffixList {
        &self.suffixes
    }

    /// Find the tracker for a host: the longest tracker domain the host is
    /// equal to or a subdomain of.
    pub fn known_tracker(&self, host: &str) -> Option<&KnownTracker> {
        self.suffixes
            .walk_suffixes(host)
            .find_map(|suffix| self.data.tracker(suffix))
    }

    /// Find the entity that owns a host, by the same suffix walk.
    pub fn entity_for_host(&self, host: &str) -> Option<&Entity> {
        self.suffixes
            .walk_suffixes(host)
            .find_map(|suffix| self.data.entity_for_domain(suffix))
    }

    /// Classify a request.
    ///
    /// Returns `None` when the resource URL is unparseable or its host is not
    /// a known tracker.
    pub fn classify(
        &self,
        resource_url: &str,
        page_url: &str,
        resource_type: Option<ResourceType>,
    ) -> Option<Classification> {
        let resource = normalize_resource_url(resource_url)?;
        let tracker = self.known_tracker(&resource.host)?;
        let owner = self.data.owner_of(tracker);
        let page_host = host_of(page_url);
        let page_host = page_host.as_deref();

        let result = |action: Action, reason: Reason| Classification {
            action,
            matched_tracker_domain: tracker.domain.clone(),
            matched_entity: owner.cloned(),
            reason,
        };

        if let Some(page) = page_host {
            if self.is_trusted(page) {
                return Some(result(Action::Ignore, Reason::TrustedSite));
            }

            if let (Some(owner), Some(page_entity)) = (owner, self.entity_for_host(page)) {
                if owner.name == page_entity.name {
                    return Some(result(Action::Ignore, Reason::SameEntity));
                }
            }
        }

        let filters = self.filters.get(&tracker.domain).map(Vec::as_slice).unwrap_or(&[]);
        for (index, (rule, filter)) in tracker.rules.iter().zip(filters).enumerate() {
            let Some(filter) = filter else {
                continue;
            };
            if !filter.is_match(&resource.url) || !self.rule_applies(rule, page_host, resource_type) {
                continue;
            }

            if self.exception_applies(rule, page_host, resource_type) {
                return Some(result(Action::Ignore, Reason::RuleException(index)));
            }
            return Some(result(rule.action, Reason::Rule(index)));
        }

        Some(result(tracker.default_action, Reason::Default))
    }

    /// Classify with the resource type given by name. Unknown names are
    /// treated as an absent type.
    pub fn classify_named(&self, resource_url: &str, page_url: &str, resource_type: &str) -> Option<Classification> {
        self.classify(resource_url, page_url, ResourceType::from_descriptor_name(resource_type))
    }

    // =========================================================================
    // Rule Checks
    // =========================================================================

    fn is_trusted(&self, page_host: &str) -> bool {
        !self.trusted_sites.is_empty()
            && self
                .suffixes
                .walk_suffixes(page_host)
                .any(|suffix| self.trusted_sites.contains(suffix))
    }

    /// Whether a page host is one of `domains` or a subdomain of one.
    fn page_in(&self, domains: &BTreeSet<String>, page_host: Option<&str>) -> bool {
        match page_host {
            Some(page) => self.suffixes.walk_suffixes(page).any(|suffix| domains.contains(suffix)),
            None => false,
        }
    }

    fn rule_applies(&self, rule: &TrackerRule, page_host: Option<&str>, resource_type: Option<ResourceType>) -> bool {
        rule.resource_types.admits(resource_type)
            && (rule.matched_domains.is_empty() || self.page_in(&rule.matched_domains, page_host))
    }

    fn exception_applies(&self, rule: &TrackerRule, page_host: Option<&str>, resource_type: Option<ResourceType>) -> bool {
        let exceptions = &rule.exceptions;
        if exceptions.is_empty() {
            return false;
        }
        exceptions.resource_types.admits(resource_type)
            && (exceptions.domains.is_empty() || self.page_in(&exceptions.domains, page_host))
    }
}

/// Compile the URL filter of every rule. A rule whose filter does not compile
/// never matches.
fn compile_rules(tracker: &KnownTracker) -> Vec<Option<Regex>> {
    tracker
        .rules
        .iter()
        .map(|rule| {
            let filter = url_filter(&tracker.domain, &rule.pattern, rule.options.subdomain_match);
            match compile_filter(&filter) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Skipping rule '{}' on {}: {}", rule.pattern, tracker.domain, e);
                    None
                }
            }
        })
        .collect()
}
