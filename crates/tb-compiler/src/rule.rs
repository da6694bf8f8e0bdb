//! Compiled content blocker rules
//!
//! A [`CompiledRule`] is one trigger/action object in the content blocking
//! host's JSON schema. Field names follow the host (`url-filter`,
//! `if-domain`, ...); empty lists are omitted because the host reads an
//! empty list as "match nothing".

use serde::{Deserialize, Serialize};
use tb_core::filter::domain_entry;
use tb_core::ResourceType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "url-filter")]
    pub url_filter: String,
    /// Host resource type names
    #[serde(rename = "resource-type", default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<String>,
    /// Host domain entries (`*domain` covers the domain and its subdomains)
    #[serde(rename = "if-domain", default, skip_serializing_if = "Vec::is_empty")]
    pub if_domain: Vec<String>,
    #[serde(rename = "unless-domain", default, skip_serializing_if = "Vec::is_empty")]
    pub unless_domain: Vec<String>,
}

impl Trigger {
    pub fn new(url_filter: impl Into<String>) -> Self {
        Self {
            url_filter: url_filter.into(),
            resource_types: Vec::new(),
            if_domain: Vec::new(),
            unless_domain: Vec::new(),
        }
    }

    pub fn with_types(mut self, types: ResourceType) -> Self {
        self.resource_types = types.host_names().into_iter().map(str::to_string).collect();
        self
    }

    /// Limit the trigger to pages on these domains or their subdomains.
    pub fn if_domains<'a, I: IntoIterator<Item = &'a String>>(mut self, domains: I) -> Self {
        self.if_domain = domains.into_iter().map(|d| domain_entry(d)).collect();
        self
    }

    /// Exclude pages on these domains or their subdomains.
    pub fn unless_domains<'a, I: IntoIterator<Item = &'a String>>(mut self, domains: I) -> Self {
        self.unless_domain = domains.into_iter().map(|d| domain_entry(d)).collect();
        self
    }
}

/// Action of a compiled rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompiledAction {
    #[serde(rename = "block")]
    Block,
    /// Cancels every earlier matching rule for this request
    #[serde(rename = "ignore-previous-rules")]
    IgnorePreviousRules,
    /// Hide page elements matching a CSS selector
    #[serde(rename = "css-display-none")]
    CssDisplayNone { selector: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledRule {
    pub trigger: Trigger,
    pub action: CompiledAction,
}

impl CompiledRule {
    pub fn new(trigger: Trigger, action: CompiledAction) -> Self {
        Self { trigger, action }
    }

    pub fn is_cosmetic(&self) -> bool {
        matches!(self.action, CompiledAction::CssDisplayNone { .. })
    }
}
