//! Core type definitions for TrackerBlock
//!
//! These types map directly to the tracker and entity descriptor files and
//! are shared by the rule compiler and the detection engine.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TrackerError;
use crate::filter::{check_pattern_syntax, compile_filter, escape_domain, url_filter};
use crate::psl::normalize_domain;

// =============================================================================
// Actions
// =============================================================================

/// Decision attached to a tracker, a tracker rule or a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The resource load is cancelled
    #[default]
    Block,
    /// The resource load is allowed
    Ignore,
}

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask. An empty mask on a rule means "all types".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ResourceType: u16 {
        const SCRIPT = 1 << 0;
        const IMAGE = 1 << 1;
        const STYLESHEET = 1 << 2;
        const FONT = 1 << 3;
        const MEDIA = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const XMLHTTPREQUEST = 1 << 6;
        const OTHER = 1 << 7;
    }
}

/// (flag, descriptor name, host name)
const TYPE_NAMES: &[(ResourceType, &str, &str)] = &[
    (ResourceType::SCRIPT, "script", "script"),
    (ResourceType::IMAGE, "image", "image"),
    (ResourceType::STYLESHEET, "stylesheet", "style-sheet"),
    (ResourceType::FONT, "font", "font"),
    (ResourceType::MEDIA, "media", "media"),
    (ResourceType::SUBDOCUMENT, "subdocument", "document"),
    (ResourceType::XMLHTTPREQUEST, "xmlhttprequest", "raw"),
    (ResourceType::OTHER, "other", "raw"),
];

impl Default for ResourceType {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceType {
    /// Parse a resource type name. Accepts descriptor names, browser request
    /// type names and the host's own names.
    pub fn from_descriptor_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "script" => Some(Self::SCRIPT),
            "image" => Some(Self::IMAGE),
            "stylesheet" | "style-sheet" => Some(Self::STYLESHEET),
            "font" => Some(Self::FONT),
            "media" => Some(Self::MEDIA),
            "subdocument" | "sub_frame" | "document" => Some(Self::SUBDOCUMENT),
            "xmlhttprequest" | "xhr" | "raw" | "fetch" => Some(Self::XMLHTTPREQUEST),
            "other" => Some(Self::OTHER),
            _ => None,
        }
    }

    /// Canonical descriptor name of a single flag.
    pub fn name(self) -> &'static str {
        TYPE_NAMES
            .iter()
            .find(|(flag, _, _)| *flag == self)
            .map_or("other", |(_, name, _)| *name)
    }

    /// Name of a single flag in the content blocking host's schema.
    pub fn host_name(self) -> &'static str {
        TYPE_NAMES
            .iter()
            .find(|(flag, _, _)| *flag == self)
            .map_or("raw", |(_, _, host)| *host)
    }

    /// Host names for every flag in the mask, in flag order, without duplicates.
    pub fn host_names(self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for flag in self.iter() {
            let name = flag.host_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Whether a rule constrained to `self` applies to a request of `requested` type.
    ///
    /// An unconstrained rule applies to everything, including requests whose
    /// type is unknown; a constrained rule never applies to an unknown type.
    #[inline]
    pub fn admits(self, requested: Option<ResourceType>) -> bool {
        if self.is_empty() {
            return true;
        }
        match requested {
            Some(requested) => self.intersects(requested),
            None => false,
        }
    }
}

/// Serializes a [`ResourceType`] mask as a list of names.
pub(crate) mod resource_types {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ResourceType;

    pub fn serialize<S: Serializer>(mask: &ResourceType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(mask.iter().map(ResourceType::name))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ResourceType, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut mask = ResourceType::empty();
        for name in &names {
            match ResourceType::from_descriptor_name(name) {
                Some(flag) => mask |= flag,
                None => return Err(D::Error::custom(format!("unknown resource type '{name}'"))),
            }
        }
        Ok(mask)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A company that owns one or more tracker domains and web properties.
///
/// Identity is the `name`: two records with the same name are the same entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default, alias = "displayName")]
    pub display_name: String,
    #[serde(default, alias = "properties")]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub prevalence: f64,
}

impl Entity {
    pub fn new<I, S>(name: &str, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            domains: domains.into_iter().map(Into::into).collect(),
            prevalence: 0.0,
        }
    }

    /// Trim the name, fill in the display name and normalize the domains.
    /// Returns `None` when the entity has no usable name.
    pub fn normalized(mut self) -> Option<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return None;
        }
        if self.display_name.trim().is_empty() {
            self.display_name = self.name.clone();
        }

        let mut domains = BTreeSet::new();
        for raw in &self.domains {
            match normalize_domain(raw) {
                Some(domain) => {
                    domains.insert(domain);
                }
                None => log::warn!("Dropping invalid domain '{}' from entity '{}'", raw, self.name),
            }
        }
        self.domains = domains;
        Some(self)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

// =============================================================================
// Trackers
// =============================================================================

fn default_true() -> bool {
    true
}

/// Matching options of a tracker rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleOptions {
    /// Also match subdomains of the tracker domain
    #[serde(default = "default_true")]
    pub subdomain_match: bool,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self { subdomain_match: true }
    }
}

/// Page domains and resource types for which a matching rule is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleExceptions {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub domains: BTreeSet<String>,
    #[serde(
        default,
        alias = "types",
        with = "resource_types",
        skip_serializing_if = "ResourceType::is_empty"
    )]
    pub resource_types: ResourceType,
}

impl RuleExceptions {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.resource_types.is_empty()
    }
}

/// A pattern/action pair scoped by resource type and visited page domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerRule {
    /// Regex fragment matched against the path and query of the resource URL
    #[serde(default, alias = "rule")]
    pub pattern: String,
    #[serde(default)]
    pub action: Action,
    #[serde(
        default,
        alias = "types",
        with = "resource_types",
        skip_serializing_if = "ResourceType::is_empty"
    )]
    pub resource_types: ResourceType,
    #[serde(default, alias = "domains", skip_serializing_if = "BTreeSet::is_empty")]
    pub matched_domains: BTreeSet<String>,
    #[serde(default)]
    pub options: RuleOptions,
    #[serde(default, skip_serializing_if = "RuleExceptions::is_empty")]
    pub exceptions: RuleExceptions,
}

impl TrackerRule {
    pub fn new(pattern: &str, action: Action) -> Self {
        Self {
            pattern: pattern.to_string(),
            action,
            resource_types: ResourceType::empty(),
            matched_domains: BTreeSet::new(),
            options: RuleOptions::default(),
            exceptions: RuleExceptions::default(),
        }
    }

    pub fn with_types(mut self, types: ResourceType) -> Self {
        self.resource_types = types;
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matched_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exceptions(mut self, exceptions: RuleExceptions) -> Self {
        self.exceptions = exceptions;
        self
    }

    pub fn exact_host(mut self) -> Self {
        self.options.subdomain_match = false;
        self
    }
}

/// A registrable domain known to serve tracking resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownTracker {
    pub domain: String,
    #[serde(
        default,
        alias = "owner",
        deserialize_with = "owner_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_entity_name: Option<String>,
    #[serde(default, alias = "default")]
    pub default_action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<TrackerRule>,
    #[serde(default)]
    pub prevalence: f64,
}

impl KnownTracker {
    pub fn new(domain: &str, default_action: Action) -> Self {
        Self {
            domain: domain.to_string(),
            owner_entity_name: None,
            default_action,
            rules: Vec::new(),
            prevalence: 0.0,
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner_entity_name = Some(owner.to_string());
        self
    }

    pub fn with_rule(mut self, rule: TrackerRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Normalize domains and owner name and check every rule pattern.
    ///
    /// A tracker that fails here is malformed input and must not reach the
    /// compiled dataset.
    pub fn normalized(mut self) -> Result<Self, TrackerError> {
        self.domain = normalize_domain(&self.domain)
            .ok_or_else(|| TrackerError::InvalidDomain(self.domain.clone()))?;

        self.owner_entity_name = self
            .owner_entity_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        for rule in &mut self.rules {
            rule.matched_domains = normalize_domain_set(&rule.matched_domains)?;
            rule.exceptions.domains = normalize_domain_set(&rule.exceptions.domains)?;

            rule.pattern = strip_host_prefix(&rule.pattern, &self.domain).to_string();
            check_pattern_syntax(&rule.pattern)?;

            let filter = url_filter(&self.domain, &rule.pattern, rule.options.subdomain_match);
            compile_filter(&filter).map_err(|source| TrackerError::InvalidPattern {
                pattern: rule.pattern.clone(),
                source,
            })?;
        }

        Ok(self)
    }
}

/// Owner as a bare name or as a `{"name": ...}` record.
fn owner_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Owner {
        Name(String),
        Record {
            #[serde(default)]
            name: Option<String>,
        },
    }

    Ok(match Option::<Owner>::deserialize(deserializer)? {
        Some(Owner::Name(name)) => Some(name),
        Some(Owner::Record { name }) => name,
        None => None,
    })
}

/// Reduce a pattern to the part after the host.
///
/// Legacy descriptors spell a rule as a host-and-path regex such as
/// `t\.example/ads`; the escaped tracker domain in front is dropped, as is
/// a leading `/`.
fn strip_host_prefix<'a>(pattern: &'a str, domain: &str) -> &'a str {
    let escaped = escape_domain(domain);
    let pattern = match pattern.get(..escaped.len()) {
        Some(head) if head.eq_ignore_ascii_case(&escaped) => &pattern[escaped.len()..],
        _ => pattern,
    };
    pattern
        .strip_prefix("\\/")
        .or_else(|| pattern.strip_prefix('/'))
        .unwrap_or(pattern)
}

fn normalize_domain_set(domains: &BTreeSet<String>) -> Result<BTreeSet<String>, TrackerError> {
    domains
        .iter()
        .map(|raw| normalize_domain(raw).ok_or_else(|| TrackerError::InvalidDomain(raw.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_from_descriptor_name() {
        assert_eq!(ResourceType::from_descriptor_name("script"), Some(ResourceType::SCRIPT));
        assert_eq!(ResourceType::from_descriptor_name("Style-Sheet"), Some(ResourceType::STYLESHEET));
        assert_eq!(ResourceType::from_descriptor_name("xhr"), Some(ResourceType::XMLHTTPREQUEST));
        assert_eq!(ResourceType::from_descriptor_name("sub_frame"), Some(ResourceType::SUBDOCUMENT));
        assert_eq!(ResourceType::from_descriptor_name("beacon"), None);
    }

    #[test]
    fn test_descriptor_names_are_separate_from_flag_names() {
        // bitflags' own lookup is by constant name and case-sensitive
        assert_eq!(ResourceType::from_name("STYLESHEET"), Some(ResourceType::STYLESHEET));
        assert_eq!(ResourceType::from_name("style-sheet"), None);
        assert_eq!(ResourceType::from_descriptor_name("STYLESHEET"), Some(ResourceType::STYLESHEET));
    }

    #[test]
    fn test_host_names_collapse_duplicates() {
        let mask = ResourceType::XMLHTTPREQUEST | ResourceType::OTHER | ResourceType::IMAGE;
        assert_eq!(mask.host_names(), vec!["image", "raw"]);
    }

    #[test]
    fn test_admits() {
        assert!(ResourceType::empty().admits(None));
        assert!(ResourceType::empty().admits(Some(ResourceType::SCRIPT)));
        assert!(ResourceType::IMAGE.admits(Some(ResourceType::IMAGE)));
        assert!(!ResourceType::IMAGE.admits(Some(ResourceType::SCRIPT)));
        assert!(!ResourceType::IMAGE.admits(None));
    }

    #[test]
    fn test_entity_identity_is_name() {
        let a = Entity::new("Example Co", ["a.example"]);
        let b = Entity::new("Example Co", ["b.example"]);
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_entity_decodes_legacy_keys() {
        let json = r#"{"name": "Example Co", "displayName": "Example", "properties": ["Site.Example."]}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        let entity = entity.normalized().unwrap();
        assert_eq!(entity.display_name, "Example");
        assert!(entity.domains.contains("site.example"));
        assert_eq!(entity.prevalence, 0.0);
    }

    #[test]
    fn test_tracker_defaults() {
        let json = r#"{"domain": "T.Example", "rules": [{"pattern": "/pixel\\.gif"}]}"#;
        let tracker: KnownTracker = serde_json::from_str(json).unwrap();
        let tracker = tracker.normalized().unwrap();
        assert_eq!(tracker.domain, "t.example");
        assert_eq!(tracker.default_action, Action::Block);
        assert_eq!(tracker.owner_entity_name, None);
        let rule = &tracker.rules[0];
        assert_eq!(rule.pattern, "pixel\\.gif");
        assert_eq!(rule.action, Action::Block);
        assert!(rule.options.subdomain_match);
        assert!(rule.resource_types.is_empty());
    }

    #[test]
    fn test_tracker_decodes_legacy_owner_and_rule() {
        let json = r#"{
            "domain": "g.example",
            "owner": {"name": "G Co"},
            "rules": [{"rule": "g\\.example/ads", "action": "block"}, {"rule": "G\\.Example\\/px"}]
        }"#;
        let tracker: KnownTracker = serde_json::from_str(json).unwrap();
        let tracker = tracker.normalized().unwrap();
        assert_eq!(tracker.owner_entity_name.as_deref(), Some("G Co"));
        assert_eq!(tracker.rules[0].pattern, "ads");
        assert_eq!(tracker.rules[1].pattern, "px");

        let json = r#"{"domain": "g.example", "owner": {}}"#;
        let tracker: KnownTracker = serde_json::from_str(json).unwrap();
        assert_eq!(tracker.owner_entity_name, None);

        let json = r#"{"domain": "g.example", "owner": "G Co"}"#;
        let tracker: KnownTracker = serde_json::from_str(json).unwrap();
        assert_eq!(tracker.owner_entity_name.as_deref(), Some("G Co"));
    }

    #[test]
    fn test_tracker_unknown_type_is_rejected() {
        let json = r#"{"domain": "t.example", "rules": [{"pattern": "", "resource_types": ["hologram"]}]}"#;
        assert!(serde_json::from_str::<KnownTracker>(json).is_err());
    }

    #[test]
    fn test_tracker_invalid_pattern_is_rejected() {
        let tracker = KnownTracker::new("t.example", Action::Block)
            .with_rule(TrackerRule::new("(unclosed", Action::Block));
        assert!(matches!(tracker.normalized(), Err(TrackerError::InvalidPattern { .. })));

        let tracker = KnownTracker::new("t.example", Action::Block)
            .with_rule(TrackerRule::new("a|b", Action::Block));
        assert!(matches!(tracker.normalized(), Err(TrackerError::UnsupportedSyntax { .. })));
    }

    #[test]
    fn test_tracker_invalid_domain_is_rejected() {
        let tracker = KnownTracker::new("not a domain", Action::Block);
        assert!(matches!(tracker.normalized(), Err(TrackerError::InvalidDomain(_))));
    }

    #[test]
    fn test_tracker_rule_round_trips_through_json() {
        let rule = TrackerRule::new("ads/.*", Action::Ignore)
            .with_types(ResourceType::IMAGE | ResourceType::SCRIPT)
            .with_domains(["site.example"]);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["resource_types"], serde_json::json!(["script", "image"]));
        assert_eq!(json["action"], "ignore");
        assert!(json.get("exceptions").is_none());
    }
}
