use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;

use super::unicode::{collapse_separators, collapse_whitespace, nfc, script_cleanup, strip_dots};
use crate::rules::{PhraseRule, ResolvedRules, RuleContext};

static SECONDARY_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:apt|apartment|suite|ste|unit|floor|room|rm|bldg|building)\b\.?\s*#?\s*[a-z0-9-]+",
    )
    .expect("invalid regex")
});
static HASH_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\s*[A-Za-z0-9-]+").expect("invalid regex"));

/// Records which steps changed the value, when tracing is on.
pub(crate) struct Steps {
    applied: Option<Vec<String>>,
}

impl Steps {
    pub(crate) fn enabled() -> Self {
        Self {
            applied: Some(Vec::new()),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self { applied: None }
    }

    fn record(&mut self, label: impl FnOnce() -> String) {
        if let Some(applied) = self.applied.as_mut() {
            applied.push(label());
        }
    }

    /// Runs a whole-value step, recording it when it changed the value.
    fn apply(&mut self, label: &str, value: String, step: impl FnOnce(&str) -> String) -> String {
        let next = step(&value);
        if next != value {
            self.record(|| label.to_string());
        }
        next
    }

    pub(crate) fn into_applied(self) -> Vec<String> {
        self.applied.unwrap_or_default()
    }
}

pub(crate) fn legal_name(value: &str, rules: &ResolvedRules, steps: &mut Steps) -> String {
    let s = steps.apply("unicode-nfc", value.to_string(), nfc);
    let s = steps.apply("script-cleanup", s, script_cleanup);
    let s = steps.apply("separator-collapse", s, collapse_separators);

    let s = replace_phrases(&s, &rules.agency_names, "agency", steps);
    let s = expand_tokens(&s, &rules.abbreviations, "abbreviation", |_| true, steps);
    let s = replace_phrases(&s, &rules.entity_types, "entity-type", steps);
    let s = apply_rules(&s, rules, RuleContext::Name, steps);
    let s = expand_tokens(&s, &rules.dotted_suffixes, "legal-suffix", |t| t.contains('.'), steps);
    let s = steps.apply("residual-punctuation", s, strip_dots);
    let s = expand_tokens(&s, &rules.legal_suffixes, "legal-suffix", |_| true, steps);
    let s = expand_tokens(&s, &rules.common_abbreviations, "common-abbreviation", |_| true, steps);
    let s = remove_stop_words(&s, rules, steps);

    steps.apply("lowercase", s, |v| collapse_whitespace(&v.to_lowercase()))
}

pub(crate) fn address(value: &str, rules: &ResolvedRules, steps: &mut Steps) -> String {
    let s = steps.apply("unicode-nfc", value.to_string(), nfc);
    let s = steps.apply("script-cleanup", s, script_cleanup);
    let s = steps.apply("secondary-unit", s, |v| {
        let without_units = SECONDARY_UNIT.replace_all(v, " ");
        HASH_UNIT.replace_all(&without_units, " ").into_owned()
    });
    let s = steps.apply("separator-collapse", s, collapse_separators);
    let s = steps.apply("residual-punctuation", s, strip_dots);
    let s = apply_rules(&s, rules, RuleContext::Address, steps);
    let s = expand_tokens(&s, &rules.address_abbreviations, "postal", |_| true, steps);

    steps.apply("lowercase", s, |v| collapse_whitespace(&v.to_lowercase()))
}

fn expand_tokens(
    value: &str,
    table: &BTreeMap<String, String>,
    label: &str,
    eligible: impl Fn(&str) -> bool,
    steps: &mut Steps,
) -> String {
    let mut out = Vec::new();
    for token in value.split(' ').filter(|t| !t.is_empty()) {
        let key = token.to_lowercase();
        match table.get(&key) {
            Some(expansion) if eligible(&key) => {
                steps.record(|| format!("{}:{}", label, key));
                out.push(expansion.clone());
            }
            _ => out.push(token.to_string()),
        }
    }
    out.join(" ")
}

fn replace_phrases(value: &str, phrases: &[PhraseRule], label: &str, steps: &mut Steps) -> String {
    let mut tokens: Vec<String> = value.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect();
    for rule in phrases {
        let mut idx = 0;
        let mut changed = false;
        while idx + rule.phrase.len() <= tokens.len() {
            if starts_with_tokens(&tokens[idx..], &rule.phrase) {
                // Already in expanded form; leave it so expansion stays idempotent.
                if starts_with_tokens(&tokens[idx..], &rule.replacement) {
                    idx += rule.replacement.len().max(1);
                    continue;
                }
                tokens
                    .splice(idx..idx + rule.phrase.len(), rule.replacement.iter().cloned())
                    .for_each(drop);
                idx += rule.replacement.len().max(1);
                changed = true;
            } else {
                idx += 1;
            }
        }
        if changed {
            steps.record(|| format!("{}:{}", label, rule.key));
        }
    }
    tokens.join(" ")
}

fn starts_with_tokens(tokens: &[String], prefix: &[String]) -> bool {
    prefix.len() <= tokens.len()
        && tokens
            .iter()
            .zip(prefix)
            .all(|(token, expected)| token.to_lowercase() == *expected)
}

fn apply_rules(value: &str, rules: &ResolvedRules, context: RuleContext, steps: &mut Steps) -> String {
    let mut current = value.to_string();
    for rule in rules.rules.iter().filter(|r| r.context == context) {
        let next = if rule.literal {
            rule.pattern
                .replace_all(&current, NoExpand(&rule.replacement))
                .into_owned()
        } else {
            rule.pattern
                .replace_all(&current, rule.replacement.as_str())
                .into_owned()
        };
        if next != current {
            steps.record(|| format!("rule:{}", rule.label));
            current = collapse_whitespace(&next);
        }
    }
    current
}

fn remove_stop_words(value: &str, rules: &ResolvedRules, steps: &mut Steps) -> String {
    let tokens: Vec<&str> = value.split(' ').filter(|t| !t.is_empty()).collect();
    let kept: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !rules.stop_words.contains(&t.to_lowercase()))
        .collect();
    if kept.is_empty() || kept.len() == tokens.len() {
        return tokens.join(" ");
    }
    steps.record(|| "stop-words".to_string());
    kept.join(" ")
}
