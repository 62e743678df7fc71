use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{CanonicalizeError, Canonicalizer, FieldKind};
use crate::rules::RuleError;

/// Distinct raw values that canonicalize to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionGroup {
    /// Shared canonical form.
    pub canonical: String,
    /// Raw inputs, sorted and de-duplicated.
    pub raw_values: Vec<String>,
}

/// Summary of a collision audit over a batch of raw values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionReport {
    /// Locale the batch was canonicalized under.
    pub locale: String,
    /// Number of inputs seen.
    pub total: usize,
    /// Number of distinct raw inputs.
    pub distinct_raw: usize,
    /// Number of distinct canonical outputs.
    pub distinct_canonical: usize,
    /// Inputs that failed to canonicalize, with the reason.
    pub rejected: Vec<(String, String)>,
    /// Groups of two or more raw values sharing a canonical form.
    pub collisions: Vec<CollisionGroup>,
}

/// Canonicalizes a batch and reports which distinct raw values collapse together.
///
/// Intended for reviewing rule-table changes: a new collision means two
/// inputs that used to yield different identifiers now yield the same one.
pub fn audit_collisions<'a, I>(
    canonicalizer: &Canonicalizer,
    values: I,
    kind: FieldKind,
    locale: &str,
) -> Result<CollisionReport, RuleError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut raw_seen = BTreeSet::new();
    let mut rejected = Vec::new();
    let mut total = 0;

    for raw in values {
        total += 1;
        raw_seen.insert(raw.to_string());
        match canonicalizer.canonicalize(raw, kind, locale) {
            Ok(canonical) => {
                groups.entry(canonical).or_default().insert(raw.to_string());
            }
            Err(CanonicalizeError::Rules(err)) => return Err(err),
            Err(err) => rejected.push((raw.to_string(), err.to_string())),
        }
    }

    let distinct_canonical = groups.len();
    let collisions = groups
        .into_iter()
        .filter(|(_, raws)| raws.len() > 1)
        .map(|(canonical, raws)| CollisionGroup {
            canonical,
            raw_values: raws.into_iter().collect(),
        })
        .collect();

    Ok(CollisionReport {
        locale: locale.to_string(),
        total,
        distinct_raw: raw_seen.len(),
        distinct_canonical,
        rejected,
        collisions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_collapsing_variants_and_rejections() {
        let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
        let report = audit_collisions(
            &canonicalizer,
            ["Acme Inc", "ACME, INC.", "Acme Incorporated", "Zenith LLC", "   "],
            FieldKind::LegalName,
            "us",
        )
        .unwrap();
        assert_eq!(report.total, 5);
        assert_eq!(report.distinct_canonical, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.collisions.len(), 1);
        assert_eq!(report.collisions[0].canonical, "acme incorporated");
        assert_eq!(report.collisions[0].raw_values.len(), 3);
    }
}
