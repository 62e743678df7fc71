use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cep_canonical::{CanonicalRecord, CanonicalTimestamp, Canonicalize, UriRef};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain separator prepended to every signing input: `b"cep:attestation:v1\0"`.
pub const ATTESTATION_DOMAIN_SEPARATOR: &[u8] = b"cep:attestation:v1\0";

/// Default proof purpose.
pub const ASSERTION_METHOD: &str = "assertionMethod";

/// Proof mechanism named by an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofType {
    /// Ed25519 signature over the signing input, base64url without padding.
    Ed25519Signature2020,
    /// Human attestation reference; carries no cryptographic proof.
    ManualAttestation,
}

impl ProofType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ProofType::Ed25519Signature2020 => "Ed25519Signature2020",
            ProofType::ManualAttestation => "ManualAttestation",
        }
    }
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim block attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// Who attests.
    pub attestor_id: String,
    /// When the attestation was made.
    pub attestation_timestamp: CanonicalTimestamp,
    /// Proof mechanism.
    pub proof_type: ProofType,
    /// Proof over the envelope's signing input.
    pub proof_value: String,
    /// Where the verification key is published.
    pub verification_method_uri: UriRef,
    /// Purpose of the proof.
    pub proof_purpose: String,
    /// Optional independent anchor for the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_uri: Option<UriRef>,
}

impl Attestation {
    /// Canonical record without `proofValue`, the form covered by the proof.
    pub fn unsigned_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("attestorId", self.attestor_id.as_str())
            .insert("attestationTimestamp", self.attestation_timestamp)
            .insert("proofType", self.proof_type.as_str())
            .insert("verificationMethodUri", self.verification_method_uri.as_str())
            .insert("proofPurpose", self.proof_purpose.as_str())
            .insert_if_present("anchorUri", self.anchor_uri.as_ref().map(UriRef::as_str));
        record
    }
}

impl Canonicalize for Attestation {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = self.unsigned_record();
        record.insert("proofValue", self.proof_value.as_str());
        record
    }
}

/// Builds the bytes a proof covers: domain separator followed by canonical bytes.
pub fn signing_input(canonical: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(ATTESTATION_DOMAIN_SEPARATOR.len() + canonical.len());
    message.extend_from_slice(ATTESTATION_DOMAIN_SEPARATOR);
    message.extend_from_slice(canonical);
    message
}

/// Party that attaches attestations to envelopes.
pub trait Attestor: Send + Sync {
    /// Identifier of the attesting party.
    fn attestor_id(&self) -> &str;

    /// Verification method published for this attestor.
    fn verification_method(&self) -> &UriRef;

    /// Proof mechanism this attestor produces.
    fn proof_type(&self) -> ProofType;

    /// Optional anchor recorded in each attestation.
    fn anchor_uri(&self) -> Option<&UriRef> {
        None
    }

    /// Produces the proof value for a signing input.
    fn prove(&self, message: &[u8]) -> String;

    /// Attestation with an empty proof, ready to be covered by the signing input.
    fn unsigned(&self, at: CanonicalTimestamp) -> Attestation {
        Attestation {
            attestor_id: self.attestor_id().to_string(),
            attestation_timestamp: at,
            proof_type: self.proof_type(),
            proof_value: String::new(),
            verification_method_uri: self.verification_method().clone(),
            proof_purpose: ASSERTION_METHOD.to_string(),
            anchor_uri: self.anchor_uri().cloned(),
        }
    }
}

/// Attestor holding an Ed25519 signing key.
pub struct Ed25519Attestor {
    attestor_id: String,
    verification_method: UriRef,
    key: SigningKey,
    anchor_uri: Option<UriRef>,
}

impl Ed25519Attestor {
    /// Creates an attestor from a 32-byte secret seed.
    pub fn from_seed(
        attestor_id: impl Into<String>,
        verification_method: UriRef,
        seed: &[u8; 32],
    ) -> Self {
        Self {
            attestor_id: attestor_id.into(),
            verification_method,
            key: SigningKey::from_bytes(seed),
            anchor_uri: None,
        }
    }

    /// Records an anchor URI in every attestation.
    pub fn with_anchor(mut self, anchor_uri: UriRef) -> Self {
        self.anchor_uri = Some(anchor_uri);
        self
    }

    /// Public key matching the signing key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl fmt::Debug for Ed25519Attestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Attestor")
            .field("attestor_id", &self.attestor_id)
            .field("verification_method", &self.verification_method)
            .field("anchor_uri", &self.anchor_uri)
            .finish_non_exhaustive()
    }
}

impl Attestor for Ed25519Attestor {
    fn attestor_id(&self) -> &str {
        &self.attestor_id
    }

    fn verification_method(&self) -> &UriRef {
        &self.verification_method
    }

    fn proof_type(&self) -> ProofType {
        ProofType::Ed25519Signature2020
    }

    fn anchor_uri(&self) -> Option<&UriRef> {
        self.anchor_uri.as_ref()
    }

    fn prove(&self, message: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.key.sign(message).to_bytes())
    }
}

/// Attestor for records vouched for by a person or process outside this system.
///
/// The proof value is a reference to the out-of-band attestation and is
/// never cryptographically verified.
#[derive(Debug, Clone)]
pub struct ManualAttestor {
    attestor_id: String,
    verification_method: UriRef,
    reference: String,
}

impl ManualAttestor {
    /// Creates a manual attestor; `reference` becomes every proof value.
    pub fn new(
        attestor_id: impl Into<String>,
        verification_method: UriRef,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            attestor_id: attestor_id.into(),
            verification_method,
            reference: reference.into(),
        }
    }
}

impl Attestor for ManualAttestor {
    fn attestor_id(&self) -> &str {
        &self.attestor_id
    }

    fn verification_method(&self) -> &UriRef {
        &self.verification_method
    }

    fn proof_type(&self) -> ProofType {
        ProofType::ManualAttestation
    }

    fn prove(&self, _message: &[u8]) -> String {
        self.reference.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attestor() -> Ed25519Attestor {
        Ed25519Attestor::from_seed(
            "cep:attestor:test",
            UriRef::parse("https://keys.example.org/test#key-1").unwrap(),
            &[7u8; 32],
        )
    }

    #[test]
    fn signing_input_is_domain_separated() {
        let message = signing_input(b"{}");
        assert!(message.starts_with(b"cep:attestation:v1\0"));
        assert!(message.ends_with(b"{}"));
    }

    #[test]
    fn ed25519_proofs_are_unpadded_base64url() {
        let proof = attestor().prove(b"message");
        assert_eq!(proof.len(), 86);
        assert!(!proof.contains('='));
        assert_eq!(proof, attestor().prove(b"message"));
    }

    #[test]
    fn unsigned_record_omits_proof_value() {
        let mut attestation =
            attestor().unsigned(CanonicalTimestamp::parse("2025-01-01T00:00:00Z").unwrap());
        attestation.proof_value = "proof".to_string();
        assert!(attestation.unsigned_record().get("proofValue").is_none());
        assert!(attestation.canonical_record().get("proofValue").is_some());
        assert_eq!(attestation.proof_purpose, ASSERTION_METHOD);
    }
}
