use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use hickory_proto::rr::{Record, RecordType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ResolveError;
use crate::proto_utils::{canonical_name, parse_record};

/// Placeholder replaced by the queried name when a record is replayed.
pub const NAME_PLACEHOLDER: &str = "{{Name}}";

/// Record type label -> record lines, as written in a fixture.
pub type RecordMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Exact domain, or a `*`-prefixed suffix wildcard (a lone `*` matches everything).
    pub name: String,
    #[serde(default)]
    pub records: RecordMap,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RecordMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_records(mut self, rtype: &str, records: &[&str]) -> Self {
        self.records.insert(
            rtype.to_ascii_uppercase(),
            records.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// `domain` must already be canonical.
    pub fn matches(&self, domain: &str) -> bool {
        let pattern = canonical_name(&self.name);
        match pattern.strip_prefix('*') {
            Some(suffix) => domain.ends_with(suffix),
            None => pattern == domain,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name.starts_with('*')
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Ordered set of replay rules, shared between replay and recording.
///
/// Reads take a snapshot of the whole rule list; writes publish a new list,
/// so a reader never sees a half-appended rule.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: ArcSwap<Vec<Rule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let rules = rules.into_iter().map(normalize_rule).collect();
        Self {
            rules: ArcSwap::from_pointee(rules),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(raw).context("parse rule fixture")?;
        Ok(Self::from_rules(file.rules))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read rule file: {}", path.display()))?;
        let store = Self::from_json(&raw)
            .with_context(|| format!("load rule file: {}", path.display()))?;
        info!(target = "rules", path = %path.display(), rules = store.len(), "rules loaded");
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String> {
        let file = RuleFile {
            rules: self.rules().as_ref().clone(),
        };
        serde_json::to_string_pretty(&file).context("serialize rules")
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let raw = self.to_json()?;
        fs::write(path, raw).with_context(|| format!("write rule file: {}", path.display()))
    }

    pub fn rules(&self) -> Arc<Vec<Rule>> {
        self.rules.load_full()
    }

    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }

    /// Every rule matching `domain`, in store order.
    pub fn find_domains(&self, domain: &str) -> Vec<Rule> {
        let domain = canonical_name(domain);
        self.rules
            .load()
            .iter()
            .filter(|rule| rule.matches(&domain))
            .cloned()
            .collect()
    }

    /// Raw templates for `domain`/`rtype`: taken from the first matching rule
    /// that defines the type.
    pub fn lookup(&self, domain: &str, rtype: RecordType) -> Option<Vec<String>> {
        let label = rtype.to_string();
        self.find_domains(domain)
            .into_iter()
            .find_map(|mut rule| rule.records.remove(&label))
    }

    /// Records answering `name`/`rtype`, with the placeholder expanded to
    /// `name` as queried. `Ok(None)` when no rule applies.
    pub fn find(&self, name: &str, rtype: RecordType) -> Result<Option<Vec<Record>>, ResolveError> {
        let Some(templates) = self.lookup(name, rtype) else {
            return Ok(None);
        };
        let records = templates
            .iter()
            .map(|t| parse_record(&expand(t, name)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(records))
    }

    /// Store `records` for exactly `domain`/`rtype`.
    ///
    /// Updates the first rule whose pattern is exactly `domain`; otherwise a
    /// new rule is appended. Wildcard rules are never modified.
    pub fn add(&self, domain: &str, rtype: RecordType, records: Vec<String>) {
        let domain = canonical_name(domain);
        let label = rtype.to_string();
        self.rules.rcu(|current| {
            let mut next = Vec::clone(current);
            match next
                .iter_mut()
                .find(|rule| !rule.is_wildcard() && canonical_name(&rule.name) == domain)
            {
                Some(rule) => {
                    rule.records.insert(label.clone(), records.clone());
                }
                None => {
                    let mut rule = Rule::new(domain.clone());
                    rule.records.insert(label.clone(), records.clone());
                    next.push(rule);
                }
            }
            next
        });
        debug!(target = "rules", domain = %domain, rtype = %label, "rule stored");
    }
}

fn normalize_rule(mut rule: Rule) -> Rule {
    rule.records = rule
        .records
        .into_iter()
        .map(|(rtype, records)| (rtype.to_ascii_uppercase(), records))
        .collect();
    rule
}

/// Replace every placeholder in `template` with `name`.
pub fn expand(template: &str, name: &str) -> String {
    if template.contains(NAME_PLACEHOLDER) {
        template.replace(NAME_PLACEHOLDER, name)
    } else {
        template.to_string()
    }
}
