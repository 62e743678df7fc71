use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cep_canonical::{CanonicalHash, UriRef};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::attestation::ProofType;
use crate::chain::check_link;
use crate::envelope::{Payload, RecordEnvelope};
use crate::identity::VerifiableId;
use crate::provenance::ProvenanceError;

/// Resolves verification-method URIs to public keys.
pub trait KeyResolver: Send + Sync {
    /// Key published at `method`, if known.
    fn resolve(&self, method: &UriRef) -> Option<VerifyingKey>;
}

/// Outcome of asking an anchor about a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOutcome {
    /// The anchor records this hash.
    Corroborated,
    /// The anchor exists and records something else.
    Contradicted,
    /// The anchor cannot be consulted.
    Unavailable,
}

/// Independent anchors that corroborate record hashes.
pub trait AnchorResolver: Send + Sync {
    /// Checks whether `anchor` corroborates `record_hash`.
    fn corroborate(&self, anchor: &UriRef, record_hash: &CanonicalHash) -> AnchorOutcome;
}

/// In-memory key registry.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<UriRef, VerifyingKey>,
}

impl StaticKeyResolver {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a key under a method URI.
    pub fn with_key(mut self, method: UriRef, key: VerifyingKey) -> Self {
        self.keys.insert(method, key);
        self
    }

    /// Publishes a key under a method URI.
    pub fn insert(&mut self, method: UriRef, key: VerifyingKey) {
        self.keys.insert(method, key);
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, method: &UriRef) -> Option<VerifyingKey> {
        self.keys.get(method).copied()
    }
}

/// In-memory anchor log.
#[derive(Debug, Clone, Default)]
pub struct StaticAnchorResolver {
    anchors: HashMap<UriRef, BTreeSet<CanonicalHash>>,
}

impl StaticAnchorResolver {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `record_hash` under `anchor`.
    pub fn anchor(&mut self, anchor: UriRef, record_hash: CanonicalHash) {
        self.anchors.entry(anchor).or_default().insert(record_hash);
    }
}

impl AnchorResolver for StaticAnchorResolver {
    fn corroborate(&self, anchor: &UriRef, record_hash: &CanonicalHash) -> AnchorOutcome {
        match self.anchors.get(anchor) {
            None => AnchorOutcome::Unavailable,
            Some(hashes) if hashes.contains(record_hash) => AnchorOutcome::Corroborated,
            Some(_) => AnchorOutcome::Contradicted,
        }
    }
}

/// Reason an envelope or link is unverified.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum VerificationFailure {
    /// No key is published for the verification method.
    #[error("unknown verification method {uri}")]
    UnknownVerificationMethod {
        /// Method URI.
        uri: String,
    },
    /// Proof value cannot be decoded.
    #[error("malformed proof: {detail}")]
    MalformedProof {
        /// Decoder message.
        detail: String,
    },
    /// Signature does not validate.
    #[error("invalid signature")]
    InvalidSignature,
    /// Proof type carries no verifiable proof.
    #[error("unsupported proof type {proof_type}")]
    UnsupportedProofType {
        /// Proof type.
        proof_type: ProofType,
    },
    /// The anchor records a different hash.
    #[error("anchor {uri} contradicts the record")]
    AnchorContradicted {
        /// Anchor URI.
        uri: String,
    },
    /// The anchor could not be consulted.
    #[error("anchor {uri} unavailable")]
    AnchorUnavailable {
        /// Anchor URI.
        uri: String,
    },
    /// Options require an anchor and none is present.
    #[error("anchor required")]
    AnchorRequired,
    /// The envelope could not be serialized.
    #[error("serialization failed: {detail}")]
    Serialization {
        /// Serializer message.
        detail: String,
    },
    /// Adjacent revisions do not chain.
    #[error("broken link: {detail}")]
    BrokenLink {
        /// Chain error message.
        detail: String,
    },
    /// A derived record does not name the expected parent.
    #[error("provenance mismatch: expected parent {expected}")]
    ProvenanceMismatch {
        /// Identifier of the expected parent.
        expected: String,
    },
}

/// Verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Every check passed.
    Verified,
    /// At least one check failed.
    Unverified,
}

/// Per-envelope verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Record identifier.
    pub verifiable_id: VerifiableId,
    /// Revision checked.
    pub revision_number: u64,
    /// Failures, empty when verified.
    pub failures: Vec<VerificationFailure>,
}

impl VerificationResult {
    /// True when nothing failed.
    pub fn is_verified(&self) -> bool {
        self.failures.is_empty()
    }

    /// Verified or unverified.
    pub fn status(&self) -> VerificationStatus {
        if self.is_verified() {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        }
    }
}

/// One end of a link: a specific revision of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEnd {
    /// Record identifier.
    pub verifiable_id: VerifiableId,
    /// Revision number.
    pub revision_number: u64,
}

impl LinkEnd {
    fn of<P: Payload>(envelope: &RecordEnvelope<P>) -> Self {
        Self {
            verifiable_id: envelope.verifiable_id.clone(),
            revision_number: envelope.revision_number,
        }
    }
}

/// A failure and the revision it was found on.
///
/// Link-level failures (broken links, provenance mismatches) belong to the
/// downstream revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributedFailure {
    /// Revision that failed.
    pub at: LinkEnd,
    /// What failed.
    pub failure: VerificationFailure,
}

/// Verification outcome of one link `from -> to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkVerdict {
    /// Upstream end.
    pub from: LinkEnd,
    /// Downstream end.
    pub to: LinkEnd,
    /// Failures of either end or of the link itself, at most once per revision.
    pub failures: Vec<AttributedFailure>,
}

impl LinkVerdict {
    /// True when nothing failed.
    pub fn is_verified(&self) -> bool {
        self.failures.is_empty()
    }

    /// Verified or unverified.
    pub fn status(&self) -> VerificationStatus {
        if self.is_verified() {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        }
    }

    /// Failures found on one revision.
    pub fn failures_at<'a>(
        &'a self,
        end: &'a LinkEnd,
    ) -> impl Iterator<Item = &'a VerificationFailure> + 'a {
        self.failures
            .iter()
            .filter(move |attributed| attributed.at == *end)
            .map(|attributed| &attributed.failure)
    }

    /// Composes `self` (A to B) with `next` (B to C) into A to C.
    ///
    /// The composite carries every failure of both links, so it is verified
    /// exactly when both are.
    pub fn compose(&self, next: &LinkVerdict) -> Result<LinkVerdict, ProvenanceError> {
        if self.to != next.from {
            return Err(ProvenanceError::Disjoint {
                left_end: format!("{}@{}", self.to.verifiable_id, self.to.revision_number),
                right_start: format!("{}@{}", next.from.verifiable_id, next.from.revision_number),
            });
        }
        let mut failures = self.failures.clone();
        merge(&mut failures, next.failures.iter().cloned());
        Ok(LinkVerdict {
            from: self.from.clone(),
            to: next.to.clone(),
            failures,
        })
    }
}

/// Verification of a whole revision chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    /// One result per revision, in order.
    pub revisions: Vec<VerificationResult>,
    /// One verdict per adjacent pair, in order.
    pub links: Vec<LinkVerdict>,
}

impl ChainVerification {
    /// True when every revision and link verified.
    pub fn is_verified(&self) -> bool {
        self.revisions.iter().all(VerificationResult::is_verified)
            && self.links.iter().all(LinkVerdict::is_verified)
    }

    /// The first-to-last link; `None` for a chain of one revision.
    pub fn composed(&self) -> Result<Option<LinkVerdict>, ProvenanceError> {
        let Some((first, rest)) = self.links.split_first() else {
            return Ok(None);
        };
        rest.iter()
            .try_fold(first.clone(), |acc, link| acc.compose(link))
            .map(Some)
    }
}

/// Verifier options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifierOptions {
    /// Treat envelopes without `anchorUri` as unverified.
    pub require_anchor: bool,
}

/// Checks attestations and links. Pure: nothing is mutated.
#[derive(Clone)]
pub struct Verifier {
    keys: Arc<dyn KeyResolver>,
    anchors: Option<Arc<dyn AnchorResolver>>,
    options: VerifierOptions,
}

impl Verifier {
    /// Verifier with a key resolver and no anchors.
    pub fn new(keys: Arc<dyn KeyResolver>) -> Self {
        Self {
            keys,
            anchors: None,
            options: VerifierOptions::default(),
        }
    }

    /// Adds an anchor resolver.
    pub fn with_anchors(mut self, anchors: Arc<dyn AnchorResolver>) -> Self {
        self.anchors = Some(anchors);
        self
    }

    /// Sets options.
    pub fn with_options(mut self, options: VerifierOptions) -> Self {
        self.options = options;
        self
    }

    /// Verifies one envelope's attestation and anchor.
    pub fn verify<P: Payload>(&self, envelope: &RecordEnvelope<P>) -> VerificationResult {
        let failures = self.envelope_failures(envelope);
        if !failures.is_empty() {
            tracing::warn!(
                verifiable_id = %envelope.verifiable_id,
                revision = envelope.revision_number,
                failures = failures.len(),
                "envelope unverified"
            );
        }
        VerificationResult {
            verifiable_id: envelope.verifiable_id.clone(),
            revision_number: envelope.revision_number,
            failures,
        }
    }

    fn envelope_failures<P: Payload>(&self, envelope: &RecordEnvelope<P>) -> Vec<VerificationFailure> {
        let attestation = &envelope.attestation;
        let mut failures = Vec::new();

        match attestation.proof_type {
            ProofType::Ed25519Signature2020 => {
                if let Err(failure) = self.check_signature(envelope) {
                    failures.push(failure);
                }
            }
            ProofType::ManualAttestation => failures.push(VerificationFailure::UnsupportedProofType {
                proof_type: attestation.proof_type,
            }),
        }

        match &attestation.anchor_uri {
            Some(anchor) => {
                let outcome = match (&self.anchors, envelope.record_hash()) {
                    (_, Err(err)) => Err(VerificationFailure::Serialization {
                        detail: err.to_string(),
                    }),
                    (None, Ok(_)) => Ok(AnchorOutcome::Unavailable),
                    (Some(anchors), Ok(hash)) => Ok(anchors.corroborate(anchor, &hash)),
                };
                match outcome {
                    Ok(AnchorOutcome::Corroborated) => {}
                    Ok(AnchorOutcome::Contradicted) => {
                        failures.push(VerificationFailure::AnchorContradicted {
                            uri: anchor.to_string(),
                        })
                    }
                    Ok(AnchorOutcome::Unavailable) => {
                        failures.push(VerificationFailure::AnchorUnavailable {
                            uri: anchor.to_string(),
                        })
                    }
                    Err(failure) => failures.push(failure),
                }
            }
            None if self.options.require_anchor => failures.push(VerificationFailure::AnchorRequired),
            None => {}
        }
        failures
    }

    fn check_signature<P: Payload>(
        &self,
        envelope: &RecordEnvelope<P>,
    ) -> Result<(), VerificationFailure> {
        let attestation = &envelope.attestation;
        let key = self
            .keys
            .resolve(&attestation.verification_method_uri)
            .ok_or_else(|| VerificationFailure::UnknownVerificationMethod {
                uri: attestation.verification_method_uri.to_string(),
            })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(attestation.proof_value.as_bytes())
            .map_err(|err| VerificationFailure::MalformedProof {
                detail: err.to_string(),
            })?;
        let signature =
            Signature::from_slice(&bytes).map_err(|err| VerificationFailure::MalformedProof {
                detail: err.to_string(),
            })?;
        let message = envelope
            .signing_bytes()
            .map_err(|err| VerificationFailure::Serialization {
                detail: err.to_string(),
            })?;
        key.verify_strict(&message, &signature)
            .map_err(|_| VerificationFailure::InvalidSignature)
    }

    /// Verifies two consecutive revisions of one record and the link between them.
    pub fn verify_revision_link<P: Payload>(
        &self,
        prior: &RecordEnvelope<P>,
        next: &RecordEnvelope<P>,
    ) -> LinkVerdict {
        let (from, to) = (LinkEnd::of(prior), LinkEnd::of(next));
        let mut failures = attribute(&from, self.envelope_failures(prior));
        merge(&mut failures, attribute(&to, self.envelope_failures(next)));
        if let Err(err) = check_link(Some(prior), next) {
            let broken = VerificationFailure::BrokenLink {
                detail: err.to_string(),
            };
            merge(&mut failures, attribute(&to, vec![broken]));
        }
        LinkVerdict { from, to, failures }
    }

    /// Verifies a derived record against the upstream record it names as parent.
    pub fn verify_provenance_link<P: Payload, Q: Payload>(
        &self,
        parent: &RecordEnvelope<P>,
        child: &RecordEnvelope<Q>,
    ) -> LinkVerdict {
        let (from, to) = (LinkEnd::of(parent), LinkEnd::of(child));
        let mut failures = attribute(&from, self.envelope_failures(parent));
        merge(&mut failures, attribute(&to, self.envelope_failures(child)));
        if child.payload.parent_id() != Some(&parent.verifiable_id) {
            let mismatch = VerificationFailure::ProvenanceMismatch {
                expected: parent.verifiable_id.to_string(),
            };
            merge(&mut failures, attribute(&to, vec![mismatch]));
        }
        LinkVerdict { from, to, failures }
    }

    /// Verifies every revision and every adjacent link of a chain.
    pub fn verify_chain<P: Payload>(&self, revisions: &[RecordEnvelope<P>]) -> ChainVerification {
        ChainVerification {
            revisions: revisions.iter().map(|revision| self.verify(revision)).collect(),
            links: revisions
                .windows(2)
                .map(|pair| self.verify_revision_link(&pair[0], &pair[1]))
                .collect(),
        }
    }
}

fn attribute(at: &LinkEnd, failures: Vec<VerificationFailure>) -> Vec<AttributedFailure> {
    failures
        .into_iter()
        .map(|failure| AttributedFailure {
            at: at.clone(),
            failure,
        })
        .collect()
}

fn merge(failures: &mut Vec<AttributedFailure>, more: impl IntoIterator<Item = AttributedFailure>) {
    for failure in more {
        if !failures.contains(&failure) {
            failures.push(failure);
        }
    }
}
