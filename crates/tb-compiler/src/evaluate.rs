//! Compiled rule evaluation
//!
//! Runs a compiled rule list against a request the way the content blocking
//! host does: rules are tested in order and the first match decides. This is
//! how compiler output is checked against the detection engine.

use regex::Regex;
use tb_core::filter::compile_filter;
use tb_core::url::{host_of, normalize_resource_url};
use tb_core::ResourceType;

use crate::rule::{CompiledAction, CompiledRule};

struct RuleMatcher<'a> {
    rule: &'a CompiledRule,
    filter: Option<Regex>,
}

/// Evaluator over a borrowed compiled rule list.
pub struct RuleEvaluator<'a> {
    matchers: Vec<RuleMatcher<'a>>,
}

impl<'a> RuleEvaluator<'a> {
    /// Prepare a rule list for evaluation. Cosmetic rules are skipped; a
    /// rule whose filter does not compile never matches.
    pub fn new(rules: &'a [CompiledRule]) -> Self {
        let matchers = rules
            .iter()
            .filter(|rule| !rule.is_cosmetic())
            .map(|rule| {
                let filter = match compile_filter(&rule.trigger.url_filter) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        log::warn!("Compiled rule has invalid url-filter '{}': {}", rule.trigger.url_filter, e);
                        None
                    }
                };
                RuleMatcher { rule, filter }
            })
            .collect();
        Self { matchers }
    }

    /// The deciding action for a request, or `None` when no rule matched.
    pub fn evaluate(
        &self,
        resource_url: &str,
        page_url: &str,
        resource_type: Option<ResourceType>,
    ) -> Option<&'a CompiledAction> {
        let resource = normalize_resource_url(resource_url)?;
        let page_host = host_of(page_url);
        let page_host = page_host.as_deref();
        let type_name = resource_type.filter(|t| !t.is_empty()).map(ResourceType::host_name);

        for matcher in &self.matchers {
            let Some(ref filter) = matcher.filter else {
                continue;
            };
            let trigger = &matcher.rule.trigger;

            if !trigger.resource_types.is_empty() {
                match type_name {
                    Some(name) if trigger.resource_types.iter().any(|t| t == name) => {}
                    _ => continue,
                }
            }
            if !trigger.if_domain.is_empty() && !page_host.is_some_and(|host| any_entry_matches(&trigger.if_domain, host)) {
                continue;
            }
            if page_host.is_some_and(|host| any_entry_matches(&trigger.unless_domain, host)) {
                continue;
            }
            if !filter.is_match(&resource.url) {
                continue;
            }

            return Some(&matcher.rule.action);
        }
        None
    }
}

/// `*domain` matches the domain and its subdomains; a bare entry matches
/// only that host.
fn any_entry_matches(entries: &[String], host: &str) -> bool {
    entries.iter().any(|entry| match entry.strip_prefix('*') {
        Some(domain) => {
            host == domain
                || (host.len() > domain.len()
                    && host.ends_with(domain)
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        }
        None => host == entry.as_str(),
    })
}
