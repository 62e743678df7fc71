use cep_canonical::{CanonicalRecord, Canonicalize, Rounding, Share, UriRef, ValidationError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

use crate::identity::VerifiableId;
use crate::schemes::IdentifierScheme;

/// How a set of identifiers was linked to one entity.
///
/// Confidence is supplied by the caller; the resolver records and propagates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConfidenceRepr", into = "ConfidenceRepr")]
pub enum ResolutionConfidence {
    /// Score 1.0: self-attested or registry-authoritative identity.
    Authoritative,
    /// Score below 1.0, produced by a documented matching method.
    Probabilistic {
        /// Match score in `[0, 1)`.
        score: Share,
        /// Matching method reference.
        method_uri: UriRef,
        /// Number of source records the match drew on, at least one.
        source_record_count: u32,
    },
}

impl ResolutionConfidence {
    /// Builds a probabilistic confidence, enforcing its invariants.
    pub fn probabilistic(
        score: Share,
        method_uri: UriRef,
        source_record_count: u32,
    ) -> Result<Self, ResolveError> {
        if score.is_negative() || score >= Share::one() {
            return Err(ResolveError::InvalidConfidence(format!(
                "probabilistic score {} outside [0, 1)",
                score
            )));
        }
        if source_record_count == 0 {
            return Err(ResolveError::InvalidConfidence(
                "probabilistic match without source records".to_string(),
            ));
        }
        Ok(ResolutionConfidence::Probabilistic {
            score,
            method_uri,
            source_record_count,
        })
    }

    /// Score in `[0, 1]`.
    pub fn score(&self) -> Share {
        match self {
            ResolutionConfidence::Authoritative => Share::one(),
            ResolutionConfidence::Probabilistic { score, .. } => *score,
        }
    }

    /// True for score 1.0.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, ResolutionConfidence::Authoritative)
    }

    fn weaker<'a>(&'a self, other: &'a Self) -> &'a Self {
        if other.score() < self.score() {
            other
        } else {
            self
        }
    }
}

impl Canonicalize for ResolutionConfidence {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record.insert("score", self.score());
        if let ResolutionConfidence::Probabilistic {
            method_uri,
            source_record_count,
            ..
        } = self
        {
            record
                .insert("methodUri", method_uri.as_str())
                .insert("sourceRecordCount", *source_record_count);
        }
        record
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfidenceRepr {
    score: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method_uri: Option<UriRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_record_count: Option<u32>,
}

impl TryFrom<ConfidenceRepr> for ResolutionConfidence {
    type Error = ResolveError;

    fn try_from(repr: ConfidenceRepr) -> Result<Self, Self::Error> {
        let (score, rounding) = Share::parse_reporting(&repr.score)
            .map_err(|err| ResolveError::InvalidConfidence(err.to_string()))?;
        if rounding == Rounding::Rounded {
            return Err(ResolveError::InvalidConfidence(format!(
                "score {} has more than four decimal places",
                repr.score
            )));
        }
        if score == Share::one() {
            if repr.method_uri.is_some() || repr.source_record_count.is_some() {
                return Err(ResolveError::InvalidConfidence(
                    "authoritative score carries match metadata".to_string(),
                ));
            }
            return Ok(ResolutionConfidence::Authoritative);
        }
        let method_uri = repr.method_uri.ok_or_else(|| {
            ResolveError::InvalidConfidence("probabilistic match without methodUri".to_string())
        })?;
        let count = repr.source_record_count.ok_or_else(|| {
            ResolveError::InvalidConfidence(
                "probabilistic match without sourceRecordCount".to_string(),
            )
        })?;
        Self::probabilistic(score, method_uri, count)
    }
}

impl From<ResolutionConfidence> for ConfidenceRepr {
    fn from(value: ResolutionConfidence) -> Self {
        match value {
            ResolutionConfidence::Authoritative => ConfidenceRepr {
                score: Share::one().to_string(),
                method_uri: None,
                source_record_count: None,
            },
            ResolutionConfidence::Probabilistic {
                score,
                method_uri,
                source_record_count,
            } => ConfidenceRepr {
                score: score.to_string(),
                method_uri: Some(method_uri),
                source_record_count: Some(source_record_count),
            },
        }
    }
}

/// Shape of an identity conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ConflictKind {
    /// One external identifier is claimed by different verifiable identifiers.
    SharedIdentifier {
        /// Scheme of the shared identifier.
        scheme: IdentifierScheme,
        /// Shared value.
        value: String,
    },
    /// One verifiable identifier claims two values under the same scheme.
    SchemeValueMismatch {
        /// Scheme with divergent values.
        scheme: IdentifierScheme,
        /// The divergent values.
        values: Vec<String>,
    },
    /// Claims name different verifiable identifiers and share nothing to link them.
    Unlinked,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::SharedIdentifier { scheme, value } => {
                write!(f, "{} {} is shared", scheme, value)
            }
            ConflictKind::SchemeValueMismatch { scheme, values } => {
                write!(f, "{} has values {}", scheme, values.join(", "))
            }
            ConflictKind::Unlinked => f.write_str("claims are unlinked"),
        }
    }
}

/// Identifier resolution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Claims disagree; requires external arbitration.
    #[error("identity conflict ({kind}) between {}", join_ids(.verifiable_ids))]
    IdentityConflict {
        /// Shape of the disagreement.
        kind: ConflictKind,
        /// Verifiable identifiers involved.
        verifiable_ids: Vec<VerifiableId>,
    },
    /// No claims were supplied.
    #[error("no identifier claims to resolve")]
    NoClaims,
    /// A claimed value is malformed for its scheme.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] ValidationError),
    /// Confidence metadata is incomplete or out of range.
    #[error("invalid resolution confidence: {0}")]
    InvalidConfidence(String),
}

fn join_ids(ids: &[VerifiableId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// One source system's claim that an external identifier names an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierClaim {
    /// Entity the claim is about.
    pub verifiable_id: VerifiableId,
    /// External scheme.
    pub scheme: IdentifierScheme,
    /// Normalized value.
    pub value: String,
    /// Confidence supplied by the claimant.
    pub confidence: ResolutionConfidence,
}

impl IdentifierClaim {
    /// Builds a claim, normalizing the value for its scheme.
    pub fn new(
        verifiable_id: VerifiableId,
        scheme: IdentifierScheme,
        value: &str,
        confidence: ResolutionConfidence,
    ) -> Result<Self, ResolveError> {
        let value = scheme.normalize_value(value)?;
        Ok(Self {
            verifiable_id,
            scheme,
            value,
            confidence,
        })
    }
}

/// Merged external identifiers for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierSet {
    /// Entity the identifiers belong to.
    pub verifiable_id: VerifiableId,
    /// Scheme to value.
    pub identifiers: BTreeMap<IdentifierScheme, String>,
    /// Weakest confidence among the merged claims.
    pub confidence: ResolutionConfidence,
}

impl IdentifierSet {
    /// Identifier with the highest scheme priority.
    pub fn primary_identifier(&self) -> Option<(&IdentifierScheme, &str)> {
        self.identifiers
            .iter()
            .min_by_key(|(scheme, _)| scheme.priority())
            .map(|(scheme, value)| (scheme, value.as_str()))
    }

    /// Value claimed under a scheme.
    pub fn get(&self, scheme: &IdentifierScheme) -> Option<&str> {
        self.identifiers.get(scheme).map(String::as_str)
    }
}

impl Canonicalize for IdentifierSet {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut identifiers = CanonicalRecord::new();
        for (scheme, value) in &self.identifiers {
            identifiers.insert(scheme.name(), value.as_str());
        }
        let mut record = CanonicalRecord::new();
        record
            .insert("verifiableId", self.verifiable_id.to_string())
            .insert("identifiers", identifiers)
            .insert("resolutionConfidence", self.confidence.canonical_record());
        record
    }
}

/// Merges claims about one entity into an [`IdentifierSet`].
///
/// Claims that share an external identifier must name the same verifiable
/// identifier; any divergence is an `IdentityConflict` and no winner is picked.
pub fn resolve_identifiers(claims: &[IdentifierClaim]) -> Result<IdentifierSet, ResolveError> {
    let first = claims.first().ok_or(ResolveError::NoClaims)?;

    let mut owners: HashMap<(&IdentifierScheme, &str), &VerifiableId> = HashMap::new();
    for claim in claims {
        let key = (&claim.scheme, claim.value.as_str());
        match owners.get(&key) {
            Some(owner) if **owner != claim.verifiable_id => {
                return Err(ResolveError::IdentityConflict {
                    kind: ConflictKind::SharedIdentifier {
                        scheme: claim.scheme.clone(),
                        value: claim.value.clone(),
                    },
                    verifiable_ids: sorted_ids([*owner, &claim.verifiable_id]),
                });
            }
            Some(_) => {}
            None => {
                owners.insert(key, &claim.verifiable_id);
            }
        }
    }

    if let Some(other) = claims
        .iter()
        .find(|claim| claim.verifiable_id != first.verifiable_id)
    {
        return Err(ResolveError::IdentityConflict {
            kind: ConflictKind::Unlinked,
            verifiable_ids: sorted_ids([&first.verifiable_id, &other.verifiable_id]),
        });
    }

    let mut identifiers: BTreeMap<IdentifierScheme, String> = BTreeMap::new();
    let mut confidence = &first.confidence;
    for claim in claims {
        if let Some(existing) = identifiers.get(&claim.scheme) {
            if *existing != claim.value {
                let mut values = vec![existing.clone(), claim.value.clone()];
                values.sort();
                return Err(ResolveError::IdentityConflict {
                    kind: ConflictKind::SchemeValueMismatch {
                        scheme: claim.scheme.clone(),
                        values,
                    },
                    verifiable_ids: vec![first.verifiable_id.clone()],
                });
            }
        } else {
            identifiers.insert(claim.scheme.clone(), claim.value.clone());
        }
        confidence = confidence.weaker(&claim.confidence);
    }

    Ok(IdentifierSet {
        verifiable_id: first.verifiable_id.clone(),
        identifiers,
        confidence: confidence.clone(),
    })
}

fn sorted_ids<'a>(ids: impl IntoIterator<Item = &'a VerifiableId>) -> Vec<VerifiableId> {
    let mut ids: Vec<VerifiableId> = ids.into_iter().cloned().collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Cross-submission index of external identifiers to verifiable identifiers.
///
/// Independent submissions that reuse an external identifier for a different
/// verifiable identifier are rejected with `IdentityConflict`.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    owners: RwLock<HashMap<(IdentifierScheme, String), VerifiableId>>,
}

impl IdentityIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every identifier of a set, or none of them on conflict.
    pub fn submit(&self, set: &IdentifierSet) -> Result<(), ResolveError> {
        let mut owners = self.owners.write();
        for (scheme, value) in &set.identifiers {
            if let Some(owner) = owners.get(&(scheme.clone(), value.clone())) {
                if *owner != set.verifiable_id {
                    tracing::warn!(
                        scheme = %scheme,
                        value = %value,
                        existing = %owner,
                        submitted = %set.verifiable_id,
                        "identity conflict"
                    );
                    return Err(ResolveError::IdentityConflict {
                        kind: ConflictKind::SharedIdentifier {
                            scheme: scheme.clone(),
                            value: value.clone(),
                        },
                        verifiable_ids: sorted_ids([owner, &set.verifiable_id]),
                    });
                }
            }
        }
        for (scheme, value) in &set.identifiers {
            owners.insert((scheme.clone(), value.clone()), set.verifiable_id.clone());
        }
        Ok(())
    }

    /// Verifiable identifier that owns an external identifier.
    pub fn lookup(&self, scheme: &IdentifierScheme, value: &str) -> Option<VerifiableId> {
        self.owners
            .read()
            .get(&(scheme.clone(), value.to_string()))
            .cloned()
    }

    /// Number of indexed external identifiers.
    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    /// True when nothing has been indexed.
    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RecordKind;
    use cep_canonical::CanonicalHash;

    fn entity(seed: &[u8]) -> VerifiableId {
        VerifiableId::new(RecordKind::Entity, "snfei", CanonicalHash::of(seed)).unwrap()
    }

    fn claim(id: &VerifiableId, scheme: IdentifierScheme, value: &str) -> IdentifierClaim {
        IdentifierClaim::new(id.clone(), scheme, value, ResolutionConfidence::Authoritative).unwrap()
    }

    fn fuzzy(score: &str) -> ResolutionConfidence {
        ResolutionConfidence::probabilistic(
            Share::parse(score).unwrap(),
            UriRef::parse("https://example.org/methods/name-match").unwrap(),
            3,
        )
        .unwrap()
    }

    #[test]
    fn claims_for_one_entity_merge() {
        let id = entity(b"a");
        let set = resolve_identifiers(&[
            claim(&id, IdentifierScheme::CanadianBn, "123456789RC0001"),
            claim(&id, IdentifierScheme::Lei, "549300ABCDEF01234567"),
        ])
        .unwrap();
        assert_eq!(set.verifiable_id, id);
        assert_eq!(
            set.primary_identifier(),
            Some((&IdentifierScheme::Lei, "549300ABCDEF01234567"))
        );
        assert!(set.confidence.is_authoritative());
    }

    #[test]
    fn shared_identifier_with_different_ids_conflicts() {
        let a = entity(b"a");
        let b = entity(b"b");
        let err = resolve_identifiers(&[
            claim(&a, IdentifierScheme::SamUei, "ABCDEFGH1234"),
            claim(&b, IdentifierScheme::SamUei, "abcdefgh1234"),
        ])
        .unwrap_err();
        match err {
            ResolveError::IdentityConflict {
                kind: ConflictKind::SharedIdentifier { scheme, value },
                verifiable_ids,
            } => {
                assert_eq!(scheme, IdentifierScheme::SamUei);
                assert_eq!(value, "ABCDEFGH1234");
                assert_eq!(verifiable_ids.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn divergent_values_under_one_scheme_conflict() {
        let id = entity(b"a");
        let err = resolve_identifiers(&[
            claim(&id, IdentifierScheme::SamUei, "ABCDEFGH1234"),
            claim(&id, IdentifierScheme::SamUei, "ZZZZZZZZ9999"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::IdentityConflict {
                kind: ConflictKind::SchemeValueMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn unrelated_ids_are_not_merged() {
        let err = resolve_identifiers(&[
            claim(&entity(b"a"), IdentifierScheme::SamUei, "ABCDEFGH1234"),
            claim(&entity(b"b"), IdentifierScheme::Lei, "549300ABCDEF01234567"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::IdentityConflict {
                kind: ConflictKind::Unlinked,
                ..
            }
        ));
    }

    #[test]
    fn merged_confidence_is_the_weakest() {
        let id = entity(b"a");
        let mut weak = claim(&id, IdentifierScheme::SamUei, "ABCDEFGH1234");
        weak.confidence = fuzzy("0.85");
        let set = resolve_identifiers(&[
            claim(&id, IdentifierScheme::Lei, "549300ABCDEF01234567"),
            weak,
        ])
        .unwrap();
        assert_eq!(set.confidence.score().to_string(), "0.8500");
    }

    #[test]
    fn probabilistic_confidence_requires_metadata() {
        let parsed: Result<ResolutionConfidence, _> =
            serde_json::from_str(r#"{"score":"0.9"}"#);
        assert!(parsed.is_err());
        let parsed: ResolutionConfidence = serde_json::from_str(r#"{"score":"1.0"}"#).unwrap();
        assert!(parsed.is_authoritative());
        assert!(ResolutionConfidence::probabilistic(
            Share::one(),
            UriRef::parse("https://example.org/m").unwrap(),
            1
        )
        .is_err());
    }

    #[test]
    fn scores_beyond_four_places_are_rejected() {
        for json in [
            r#"{"score":"0.99995","methodUri":"https://example.org/m","sourceRecordCount":3}"#,
            r#"{"score":"0.99995"}"#,
            r#"{"score":"0.12345","methodUri":"https://example.org/m","sourceRecordCount":3}"#,
        ] {
            let parsed: Result<ResolutionConfidence, _> = serde_json::from_str(json);
            assert!(parsed.is_err(), "{json}");
        }
        let parsed: ResolutionConfidence = serde_json::from_str(
            r#"{"score":"0.9999","methodUri":"https://example.org/m","sourceRecordCount":3}"#,
        )
        .unwrap();
        assert_eq!(parsed.score().to_string(), "0.9999");
        assert!(!parsed.is_authoritative());
    }

    #[test]
    fn authoritative_score_rejects_match_metadata() {
        let parsed: Result<ResolutionConfidence, _> = serde_json::from_str(
            r#"{"score":"1","methodUri":"https://example.org/m","sourceRecordCount":3}"#,
        );
        assert!(parsed.is_err());
        let round_trip = serde_json::to_string(&fuzzy("0.85")).unwrap();
        let parsed: ResolutionConfidence = serde_json::from_str(&round_trip).unwrap();
        assert_eq!(parsed, fuzzy("0.85"));
    }

    #[test]
    fn index_rejects_reuse_atomically() {
        let index = IdentityIndex::new();
        let a = entity(b"a");
        let b = entity(b"b");
        index
            .submit(&resolve_identifiers(&[claim(&a, IdentifierScheme::SamUei, "ABCDEFGH1234")]).unwrap())
            .unwrap();
        let second = resolve_identifiers(&[
            claim(&b, IdentifierScheme::Lei, "549300ABCDEF01234567"),
            claim(&b, IdentifierScheme::SamUei, "ABCDEFGH1234"),
        ])
        .unwrap();
        assert!(index.submit(&second).is_err());
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.lookup(&IdentifierScheme::SamUei, "ABCDEFGH1234"),
            Some(a)
        );
    }
}
