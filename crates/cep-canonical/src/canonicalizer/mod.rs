//! Locale-aware canonicalization of raw identity-bearing field values.
//!
//! Every field kind runs a fixed pipeline. For names and addresses:
//! Unicode NFC, script-preserving cleanup, separator collapse, locale
//! expansion, then lowercasing. The steps never reorder and never skip.

mod audit;
mod pipeline;
pub mod unicode;

pub use audit::{audit_collisions, CollisionGroup, CollisionReport};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::digest::CanonicalHash;
use crate::identifiers::{CountryCode, JurisdictionCode};
use crate::rules::{ResolvedRules, RuleError, RuleRegistry};
use pipeline::Steps;

static YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}$").expect("invalid regex"));

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%d/%m/%Y"];

/// Kind of raw field, selecting the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    /// Legal or registered name of an organization.
    LegalName,
    /// Street address.
    Address,
    /// ISO 3166 country or subdivision code.
    Jurisdiction,
    /// ISO 3166-1 alpha-2 country code.
    CountryCode,
    /// Registration or formation date.
    RegistrationDate,
    /// Case-sensitive free text.
    Text,
}

impl FieldKind {
    /// Field name used in errors and provenance.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::LegalName => "legalName",
            FieldKind::Address => "address",
            FieldKind::Jurisdiction => "jurisdiction",
            FieldKind::CountryCode => "countryCode",
            FieldKind::RegistrationDate => "registrationDate",
            FieldKind::Text => "text",
        }
    }

    /// Whether letter case is insignificant for this kind.
    pub fn is_case_insensitive(self) -> bool {
        matches!(self, FieldKind::LegalName | FieldKind::Address)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a field cannot be canonicalized.
#[derive(thiserror::Error, Debug)]
pub enum CanonicalizeError {
    /// A required identity-bearing field is absent or empty after cleanup.
    #[error("missing identity field: {0}")]
    MissingIdentityField(String),
    /// The value is present but cannot take the field's canonical form.
    #[error("invalid {field} value '{value}': {reason}")]
    InvalidFieldValue {
        /// Field name.
        field: String,
        /// Offending raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The locale's rule tables could not be resolved.
    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Provenance of one canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalizationTrace {
    /// Field kind.
    pub field: FieldKind,
    /// Locale key as requested.
    pub requested_locale: String,
    /// Rule tables that contributed, most specific first.
    pub resolved_keys: Vec<String>,
    /// Versions of those tables.
    pub table_versions: Vec<String>,
    /// Config hashes of those tables.
    pub config_hashes: Vec<CanonicalHash>,
    /// Steps and rules that changed the value, in order.
    pub applied: Vec<String>,
}

/// Canonicalizer for raw field values.
///
/// Cloning is cheap; clones share the registry and its cache.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    registry: Arc<RuleRegistry>,
}

impl Canonicalizer {
    /// Creates a canonicalizer over the given rule tables.
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Creates a canonicalizer over the built-in rule tables.
    pub fn with_builtin_rules() -> Result<Self, RuleError> {
        Ok(Self::new(RuleRegistry::builtin()?))
    }

    /// Rule tables in use.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Canonicalizes `value` as `kind` under `locale`.
    pub fn canonicalize(
        &self,
        value: &str,
        kind: FieldKind,
        locale: &str,
    ) -> Result<String, CanonicalizeError> {
        self.run(kind.name(), value, kind, locale, &mut Steps::disabled())
    }

    /// Like [`canonicalize`](Self::canonicalize), reporting which tables and rules applied.
    pub fn canonicalize_traced(
        &self,
        value: &str,
        kind: FieldKind,
        locale: &str,
    ) -> Result<(String, CanonicalizationTrace), CanonicalizeError> {
        let rules = self.registry.resolve(locale)?;
        let mut steps = Steps::enabled();
        let canonical = self.run_with(kind.name(), value, kind, &rules, &mut steps)?;
        let trace = CanonicalizationTrace {
            field: kind,
            requested_locale: rules.requested().to_string(),
            resolved_keys: rules.resolved_keys().to_vec(),
            table_versions: rules.versions().to_vec(),
            config_hashes: rules.config_hashes().to_vec(),
            applied: steps.into_applied(),
        };
        Ok((canonical, trace))
    }

    /// Canonicalizes a required named field; `None` is a missing identity field.
    pub fn canonicalize_field(
        &self,
        field: &str,
        value: Option<&str>,
        kind: FieldKind,
        locale: &str,
    ) -> Result<String, CanonicalizeError> {
        let value = value.ok_or_else(|| CanonicalizeError::MissingIdentityField(field.to_string()))?;
        self.run(field, value, kind, locale, &mut Steps::disabled())
    }

    fn run(
        &self,
        field: &str,
        value: &str,
        kind: FieldKind,
        locale: &str,
        steps: &mut Steps,
    ) -> Result<String, CanonicalizeError> {
        match kind {
            FieldKind::LegalName | FieldKind::Address => {
                let rules = self.registry.resolve(locale)?;
                self.run_with(field, value, kind, &rules, steps)
            }
            _ => self.run_without_rules(field, value, kind),
        }
    }

    fn run_with(
        &self,
        field: &str,
        value: &str,
        kind: FieldKind,
        rules: &ResolvedRules,
        steps: &mut Steps,
    ) -> Result<String, CanonicalizeError> {
        let canonical = match kind {
            FieldKind::LegalName => pipeline::legal_name(value, rules, steps),
            FieldKind::Address => pipeline::address(value, rules, steps),
            _ => return self.run_without_rules(field, value, kind),
        };
        if canonical.is_empty() {
            return Err(CanonicalizeError::MissingIdentityField(field.to_string()));
        }
        Ok(canonical)
    }

    fn run_without_rules(
        &self,
        field: &str,
        value: &str,
        kind: FieldKind,
    ) -> Result<String, CanonicalizeError> {
        let trimmed = unicode::collapse_whitespace(&unicode::strip_controls(value));
        if trimmed.is_empty() {
            return Err(CanonicalizeError::MissingIdentityField(field.to_string()));
        }
        let invalid = |reason: &str| CanonicalizeError::InvalidFieldValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        match kind {
            FieldKind::Jurisdiction => {
                let code = trimmed.to_uppercase().replace(['_', '/', ' '], "-");
                JurisdictionCode::parse(code)
                    .map(String::from)
                    .map_err(|_| invalid("expected an ISO 3166 code such as US or US-CA"))
            }
            FieldKind::CountryCode => CountryCode::parse(trimmed.to_uppercase())
                .map(String::from)
                .map_err(|_| invalid("expected an ISO 3166-1 alpha-2 code")),
            FieldKind::RegistrationDate => {
                canonical_date(&trimmed).ok_or_else(|| invalid("unrecognized date format"))
            }
            FieldKind::Text => Ok(unicode::nfc(&trimmed)),
            FieldKind::LegalName | FieldKind::Address => Err(invalid("requires rule tables")),
        }
    }
}

fn canonical_date(value: &str) -> Option<String> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    if YEAR_ONLY.is_match(value) {
        return Some(format!("{}-01-01", value));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonicalizer() -> Canonicalizer {
        Canonicalizer::with_builtin_rules().unwrap()
    }

    #[test]
    fn legal_suffix_variants_converge() {
        let c = canonicalizer();
        let a = c.canonicalize("Acme, Inc.", FieldKind::LegalName, "us").unwrap();
        let b = c.canonicalize("ACME INCORPORATED", FieldKind::LegalName, "us").unwrap();
        let d = c.canonicalize("acme inc", FieldKind::LegalName, "us").unwrap();
        assert_eq!(a, "acme incorporated");
        assert_eq!(a, b);
        assert_eq!(a, d);
    }

    #[test]
    fn dotted_suffix_expands_before_dots_are_stripped() {
        let c = canonicalizer();
        assert_eq!(
            c.canonicalize("Smith & Jones L.L.C.", FieldKind::LegalName, "us").unwrap(),
            "smith jones limited liability company"
        );
        assert_eq!(
            c.canonicalize("Rivera P.A.", FieldKind::LegalName, "us").unwrap(),
            "rivera professional association"
        );
    }

    #[test]
    fn empty_after_cleanup_is_missing() {
        let c = canonicalizer();
        let err = c.canonicalize(" ?!  ", FieldKind::LegalName, "us").unwrap_err();
        assert!(matches!(err, CanonicalizeError::MissingIdentityField(f) if f == "legalName"));
        let err = c
            .canonicalize_field("address", None, FieldKind::Address, "us")
            .unwrap_err();
        assert!(matches!(err, CanonicalizeError::MissingIdentityField(f) if f == "address"));
    }

    #[test]
    fn jurisdiction_codes_uppercase_and_validate() {
        let c = canonicalizer();
        assert_eq!(c.canonicalize(" us_ca ", FieldKind::Jurisdiction, "").unwrap(), "US-CA");
        assert!(matches!(
            c.canonicalize("California", FieldKind::Jurisdiction, ""),
            Err(CanonicalizeError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn registration_dates_accept_common_layouts() {
        let c = canonicalizer();
        for raw in ["2020-03-04", "03/04/2020", "03-04-2020"] {
            assert_eq!(
                c.canonicalize(raw, FieldKind::RegistrationDate, "").unwrap(),
                "2020-03-04"
            );
        }
        assert_eq!(
            c.canonicalize("25/12/2019", FieldKind::RegistrationDate, "").unwrap(),
            "2019-12-25"
        );
        assert_eq!(c.canonicalize("1998", FieldKind::RegistrationDate, "").unwrap(), "1998-01-01");
        assert!(c.canonicalize("someday", FieldKind::RegistrationDate, "").is_err());
    }

    #[test]
    fn text_keeps_case() {
        let c = canonicalizer();
        assert_eq!(c.canonicalize("  Mixed\tCase  ", FieldKind::Text, "").unwrap(), "Mixed Case");
    }

    #[test]
    fn trace_names_tables_and_rules() {
        let c = canonicalizer();
        let (value, trace) = c
            .canonicalize_traced("MTA Bus Co.", FieldKind::LegalName, "US-NY")
            .unwrap();
        assert_eq!(value, "metropolitan transportation authority bus company");
        assert_eq!(trace.resolved_keys, ["us/ny", "us", "base"]);
        assert!(trace.applied.contains(&"abbreviation:mta".to_string()));
        assert!(trace.applied.contains(&"legal-suffix:co.".to_string()));
    }
}
