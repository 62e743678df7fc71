//! Versioned localization rule tables and their cascade.
//!
//! A table belongs to one jurisdiction key (`base`, `us`, `us/ny`, ...) and
//! names its parent. Resolving a locale merges the chain from the root down:
//! child map entries override the parent's, custom rules concatenate parent
//! first, stop words are the union.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::canonicalizer::unicode::{collapse_separators, script_cleanup};
use crate::digest::CanonicalHash;

/// Key of the root table every cascade ends in.
pub const BASE_KEY: &str = "base";

const BUILTIN_TABLES: &[(&str, &str)] = &[
    ("base.json", include_str!("../../rules/base.json")),
    ("us.json", include_str!("../../rules/us.json")),
    ("us-ca.json", include_str!("../../rules/us-ca.json")),
    ("us-ny.json", include_str!("../../rules/us-ny.json")),
    ("us-il.json", include_str!("../../rules/us-il.json")),
    ("ca.json", include_str!("../../rules/ca.json")),
    ("ca-on.json", include_str!("../../rules/ca-on.json")),
    ("ca-qc.json", include_str!("../../rules/ca-qc.json")),
];

static LOCALE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_/\s]+").expect("invalid regex"));

/// Errors raised while loading or resolving rule tables.
#[derive(thiserror::Error, Debug)]
pub enum RuleError {
    /// A table document could not be parsed.
    #[error("rule table {source_name} is malformed: {source}")]
    Parse {
        /// File or embedded name of the document.
        source_name: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// A regex rule failed to compile.
    #[error("rule table {jurisdiction} has an invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Table key.
        jurisdiction: String,
        /// Offending pattern.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
    /// A table names a parent that is not loaded.
    #[error("rule table {jurisdiction} names unknown parent {parent}")]
    UnknownParent {
        /// Table key.
        jurisdiction: String,
        /// Missing parent key.
        parent: String,
    },
    /// The parent chain loops.
    #[error("rule table parent chain loops at {0}")]
    ParentCycle(String),
    /// Reading a rule directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The table could not be encoded for hashing.
    #[error("rule table encoding failed: {0}")]
    Encoding(String),
}

/// Field context a custom rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleContext {
    /// Legal and agency names.
    #[default]
    Name,
    /// Street addresses.
    Address,
}

/// One custom rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRule {
    /// Literal text or regex, matched case-insensitively against the collapsed value.
    pub pattern: String,
    /// Replacement text (regex rules may use `$1`-style groups).
    pub replacement: String,
    /// Whether `pattern` is a regex.
    #[serde(default)]
    pub regex: bool,
    /// Field context.
    #[serde(default)]
    pub context: RuleContext,
}

/// Externally supplied localization table for one jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleTable {
    /// Table key, e.g. `us/ny`.
    pub jurisdiction: String,
    /// Parent table key; tables without one inherit from `base`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Table version, recorded in provenance.
    pub version: String,
    /// Multi-word agency phrases and their expansions.
    #[serde(default)]
    pub agency_names: BTreeMap<String, String>,
    /// Jurisdiction-specific single-token abbreviations.
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,
    /// Local entity-type phrases and their canonical forms.
    #[serde(default)]
    pub entity_types: BTreeMap<String, String>,
    /// Legal-entity suffixes; keys containing `.` are the dotted forms.
    #[serde(default)]
    pub legal_suffixes: BTreeMap<String, String>,
    /// Generic business-name abbreviations.
    #[serde(default)]
    pub common_abbreviations: BTreeMap<String, String>,
    /// Postal abbreviations used in addresses.
    #[serde(default)]
    pub address_abbreviations: BTreeMap<String, String>,
    /// Ordered custom rules.
    #[serde(default)]
    pub rules: Vec<LocalRule>,
    /// Words dropped from names.
    #[serde(default)]
    pub stop_words: BTreeSet<String>,
}

impl RuleTable {
    /// Parses a JSON table document.
    pub fn from_json(source_name: &str, json: &str) -> Result<Self, RuleError> {
        serde_json::from_str(json).map_err(|source| RuleError::Parse {
            source_name: source_name.to_string(),
            source,
        })
    }

    /// SHA-256 of the table's canonical JSON.
    pub fn config_hash(&self) -> Result<CanonicalHash, RuleError> {
        let value =
            serde_json::to_value(self).map_err(|err| RuleError::Encoding(err.to_string()))?;
        let text = canonical_json::to_string(&value)
            .map_err(|err| RuleError::Encoding(err.to_string()))?;
        Ok(CanonicalHash::of(text.as_bytes()))
    }
}

/// Normalizes a locale hint (`US-NY`, `us_ny`, `us/ny`) to a table key.
pub fn locale_key(locale: &str) -> String {
    let trimmed = locale.trim().to_lowercase();
    if trimmed.is_empty() {
        return BASE_KEY.to_string();
    }
    LOCALE_SEPARATORS
        .replace_all(&trimmed, "/")
        .trim_matches('/')
        .to_string()
}

/// Brings table text into the form values have when expansion runs.
pub(crate) fn key_form(value: &str) -> String {
    collapse_separators(&script_cleanup(&crate::canonicalizer::unicode::nfc(value))).to_lowercase()
}

fn tokens(value: &str) -> Vec<String> {
    key_form(value).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// A multi-token phrase replacement.
#[derive(Debug, Clone)]
pub(crate) struct PhraseRule {
    pub key: String,
    pub phrase: Vec<String>,
    pub replacement: Vec<String>,
}

/// A custom rule ready to apply.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub label: String,
    pub context: RuleContext,
    pub pattern: Regex,
    pub replacement: String,
    pub literal: bool,
}

/// The merged, compiled rule set for one locale plus its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedRules {
    requested: String,
    resolved_keys: Vec<String>,
    versions: Vec<String>,
    config_hashes: Vec<CanonicalHash>,
    pub(crate) agency_names: Vec<PhraseRule>,
    pub(crate) abbreviations: BTreeMap<String, String>,
    pub(crate) entity_types: Vec<PhraseRule>,
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) dotted_suffixes: BTreeMap<String, String>,
    pub(crate) legal_suffixes: BTreeMap<String, String>,
    pub(crate) common_abbreviations: BTreeMap<String, String>,
    pub(crate) address_abbreviations: BTreeMap<String, String>,
    pub(crate) stop_words: BTreeSet<String>,
}

impl ResolvedRules {
    /// Locale key as requested.
    pub fn requested(&self) -> &str {
        &self.requested
    }

    /// Table keys that contributed, most specific first.
    pub fn resolved_keys(&self) -> &[String] {
        &self.resolved_keys
    }

    /// Versions of the contributing tables, aligned with [`resolved_keys`](Self::resolved_keys).
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// Config hashes of the contributing tables, aligned with [`resolved_keys`](Self::resolved_keys).
    pub fn config_hashes(&self) -> &[CanonicalHash] {
        &self.config_hashes
    }

    fn compile(requested: String, chain: &[&RuleTable]) -> Result<Self, RuleError> {
        // chain is most specific first; merge from the root down.
        let mut agency = BTreeMap::new();
        let mut abbreviations = BTreeMap::new();
        let mut entity_types = BTreeMap::new();
        let mut suffixes = BTreeMap::new();
        let mut common = BTreeMap::new();
        let mut address = BTreeMap::new();
        let mut rules = Vec::new();
        let mut stop_words = BTreeSet::new();

        for table in chain.iter().rev() {
            agency.extend(table.agency_names.clone());
            abbreviations.extend(table.abbreviations.clone());
            entity_types.extend(table.entity_types.clone());
            suffixes.extend(table.legal_suffixes.clone());
            common.extend(table.common_abbreviations.clone());
            address.extend(table.address_abbreviations.clone());
            for (idx, rule) in table.rules.iter().enumerate() {
                rules.push(compile_rule(&table.jurisdiction, idx, rule)?);
            }
            stop_words.extend(table.stop_words.iter().map(|w| key_form(w)));
        }

        let mut dotted_suffixes = BTreeMap::new();
        let mut legal_suffixes = BTreeMap::new();
        for (key, value) in suffixes {
            let key = key_form(&key);
            if key.contains('.') {
                dotted_suffixes.insert(key, key_form(&value));
            } else {
                legal_suffixes.insert(key, key_form(&value));
            }
        }

        let mut config_hashes = Vec::with_capacity(chain.len());
        for table in chain {
            config_hashes.push(table.config_hash()?);
        }

        Ok(Self {
            requested,
            resolved_keys: chain.iter().map(|t| t.jurisdiction.clone()).collect(),
            versions: chain.iter().map(|t| t.version.clone()).collect(),
            config_hashes,
            agency_names: phrase_rules(agency),
            abbreviations: token_map(abbreviations),
            entity_types: phrase_rules(entity_types),
            rules,
            dotted_suffixes,
            legal_suffixes,
            common_abbreviations: token_map(common),
            address_abbreviations: token_map(address),
            stop_words,
        })
    }
}

fn token_map(map: BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.into_iter()
        .map(|(k, v)| (key_form(&k), key_form(&v)))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn phrase_rules(map: BTreeMap<String, String>) -> Vec<PhraseRule> {
    let mut rules: Vec<PhraseRule> = map
        .into_iter()
        .map(|(key, value)| PhraseRule {
            phrase: tokens(&key),
            replacement: tokens(&value),
            key,
        })
        .filter(|rule| !rule.phrase.is_empty())
        .collect();
    // Longer phrases first so that a phrase is never pre-empted by one of its parts.
    rules.sort_by(|a, b| {
        b.phrase
            .len()
            .cmp(&a.phrase.len())
            .then_with(|| a.key.cmp(&b.key))
    });
    rules
}

fn compile_rule(jurisdiction: &str, idx: usize, rule: &LocalRule) -> Result<CompiledRule, RuleError> {
    let source_pattern = if rule.regex {
        rule.pattern.clone()
    } else {
        regex::escape(&rule.pattern)
    };
    let pattern = Regex::new(&format!("(?i){}", source_pattern)).map_err(|source| {
        RuleError::InvalidPattern {
            jurisdiction: jurisdiction.to_string(),
            pattern: rule.pattern.clone(),
            source,
        }
    })?;
    Ok(CompiledRule {
        label: format!("{}#{}", jurisdiction, idx),
        context: rule.context,
        pattern,
        replacement: rule.replacement.to_lowercase(),
        literal: !rule.regex,
    })
}

/// Registry of rule tables with a cache of resolved cascades.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    tables: BTreeMap<String, RuleTable>,
    cache: RwLock<HashMap<String, Arc<ResolvedRules>>>,
}

impl RuleRegistry {
    /// Registry with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the tables shipped in this crate.
    pub fn builtin() -> Result<Self, RuleError> {
        let mut registry = Self::new();
        for (name, json) in BUILTIN_TABLES {
            registry.load_json(name, json)?;
        }
        Ok(registry)
    }

    /// Adds or replaces a table.
    pub fn insert(&mut self, mut table: RuleTable) {
        table.jurisdiction = locale_key(&table.jurisdiction);
        table.parent = table.parent.as_deref().map(locale_key);
        self.tables.insert(table.jurisdiction.clone(), table);
        self.cache.write().clear();
    }

    /// Parses and adds one JSON table.
    pub fn load_json(&mut self, source_name: &str, json: &str) -> Result<(), RuleError> {
        let table = RuleTable::from_json(source_name, json)?;
        self.insert(table);
        Ok(())
    }

    /// Loads every `*.json` file in `dir`, in file-name order. Returns the number loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, RuleError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in &paths {
            let json = fs::read_to_string(path)?;
            self.load_json(&path.display().to_string(), &json)?;
        }
        Ok(paths.len())
    }

    /// Table registered under `key`.
    pub fn table(&self, key: &str) -> Option<&RuleTable> {
        self.tables.get(&locale_key(key))
    }

    /// Registered table keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Resolves the merged rules for a locale hint.
    ///
    /// Unknown keys fall back to their nearest registered ancestor (`us/zz`
    /// to `us`), then to `base`.
    pub fn resolve(&self, locale: &str) -> Result<Arc<ResolvedRules>, RuleError> {
        let requested = locale_key(locale);
        if let Some(hit) = self.cache.read().get(&requested) {
            return Ok(Arc::clone(hit));
        }

        let chain = self.chain_for(&requested)?;
        let resolved = Arc::new(ResolvedRules::compile(requested.clone(), &chain)?);
        self.cache
            .write()
            .insert(requested, Arc::clone(&resolved));
        Ok(resolved)
    }

    fn chain_for(&self, requested: &str) -> Result<Vec<&RuleTable>, RuleError> {
        let mut key = requested.to_string();
        while !self.tables.contains_key(&key) {
            key = match key.rsplit_once('/') {
                Some((parent, _)) => parent.to_string(),
                None if key != BASE_KEY => BASE_KEY.to_string(),
                None => return Ok(Vec::new()),
            };
        }

        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = Some(key);
        while let Some(key) = current {
            if !seen.insert(key.clone()) {
                return Err(RuleError::ParentCycle(key));
            }
            let table = &self.tables[&key];
            chain.push(table);
            current = match &table.parent {
                Some(parent) if self.tables.contains_key(parent) => Some(parent.clone()),
                Some(parent) => {
                    return Err(RuleError::UnknownParent {
                        jurisdiction: key,
                        parent: parent.clone(),
                    })
                }
                None if key != BASE_KEY && self.tables.contains_key(BASE_KEY) => {
                    Some(BASE_KEY.to_string())
                }
                None => None,
            };
        }
        Ok(chain)
    }
}
