use cep_canonical::{
    CanonicalHash, CanonicalRecord, CanonicalTimestamp, Canonicalize, SchemaVersion,
    SerializeError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::attestation::{signing_input, Attestation, Attestor};
use crate::chain::{next_revision_number, ChainIntegrityError};
use crate::errors::CoreError;
use crate::identity::{RecordKind, VerifiableId};

/// Record body carried by an envelope.
pub trait Payload:
    Canonicalize + Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Record kind of envelopes carrying this payload.
    const KIND: RecordKind;

    /// Checks payload-level invariants.
    fn validate(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Upstream record this one derives from (parent relationship or exchange).
    fn parent_id(&self) -> Option<&VerifiableId> {
        None
    }
}

/// Lifecycle status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// In force.
    Active,
    /// Dormant but not ended.
    Inactive,
    /// Temporarily not in force.
    Suspended,
    /// Ended.
    Dissolved,
    /// Folded into another record.
    Merged,
    /// Replaced by a successor revision.
    Superseded,
}

impl StatusCode {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Active => "ACTIVE",
            StatusCode::Inactive => "INACTIVE",
            StatusCode::Suspended => "SUSPENDED",
            StatusCode::Dissolved => "DISSOLVED",
            StatusCode::Merged => "MERGED",
            StatusCode::Superseded => "SUPERSEDED",
        }
    }
}

/// Status block of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatus {
    /// Status code.
    pub status_code: StatusCode,
    /// Free-text reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// When the status took effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_effective_date: Option<CanonicalTimestamp>,
}

impl RecordStatus {
    /// Status with a code only.
    pub fn new(status_code: StatusCode) -> Self {
        Self {
            status_code,
            status_reason: None,
            status_effective_date: None,
        }
    }

    /// `ACTIVE` status.
    pub fn active() -> Self {
        Self::new(StatusCode::Active)
    }

    /// Sets the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }

    /// Sets the effective date.
    pub fn effective(mut self, at: CanonicalTimestamp) -> Self {
        self.status_effective_date = Some(at);
        self
    }
}

impl Canonicalize for RecordStatus {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("statusCode", self.status_code.as_str())
            .insert_if_present("statusReason", self.status_reason.as_deref())
            .insert_if_present("statusEffectiveDate", self.status_effective_date);
        record
    }
}

/// Versioned wrapper shared by every record kind.
///
/// Envelopes are immutable once assembled; amendments produce a new
/// revision linked through `previous_record_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope<P> {
    /// Record kind discriminator.
    pub record_kind: RecordKind,
    /// Identifier of the logical record.
    pub verifiable_id: VerifiableId,
    /// Schema version of the envelope.
    pub schema_version: SchemaVersion,
    /// Revision number, starting at 1.
    pub revision_number: u64,
    /// When the record was first observed.
    pub first_seen_at: CanonicalTimestamp,
    /// When this revision was recorded.
    pub last_updated_at: CanonicalTimestamp,
    /// Start of validity.
    pub valid_from: CanonicalTimestamp,
    /// End of validity, set on supersession.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<CanonicalTimestamp>,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Record hash of the previous revision; null for revision 1.
    #[serde(default)]
    pub previous_record_hash: Option<CanonicalHash>,
    /// Attestation over this revision.
    pub attestation: Attestation,
    /// Record body.
    pub payload: P,
}

impl<P: Payload> RecordEnvelope<P> {
    fn record_with(&self, attestation: CanonicalRecord) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("recordKind", self.record_kind.as_str())
            .insert("verifiableId", self.verifiable_id.to_string())
            .insert("schemaVersion", self.schema_version.as_str())
            .insert("revisionNumber", self.revision_number)
            .insert("firstSeenAt", self.first_seen_at)
            .insert("lastUpdatedAt", self.last_updated_at)
            .insert("validFrom", self.valid_from)
            .insert_if_present("validTo", self.valid_to)
            .insert("status", self.status.canonical_record())
            .insert_if_present("previousRecordHash", self.previous_record_hash.clone())
            .insert("attestation", attestation)
            .insert("payload", self.payload.canonical_record());
        record
    }

    /// Canonical record with `proofValue` omitted.
    pub fn signing_record(&self) -> CanonicalRecord {
        self.record_with(self.attestation.unsigned_record())
    }

    /// Bytes covered by the attestation proof.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        Ok(signing_input(self.signing_record().to_canonical_string()?.as_bytes()))
    }

    /// SHA-256 of the full canonical serialization; the successor's `previousRecordHash`.
    pub fn record_hash(&self) -> Result<CanonicalHash, SerializeError> {
        self.canonical_hash()
    }

    /// True when payload, status, or validity window differ from `other`.
    pub fn differs_substantively(&self, other: &Self) -> Result<bool, SerializeError> {
        Ok(self.payload.to_canonical_string()? != other.payload.to_canonical_string()?
            || self.status != other.status
            || self.valid_from != other.valid_from
            || self.valid_to != other.valid_to)
    }

    /// True when `at` falls inside `[valid_from, valid_to)`.
    pub fn is_valid_at(&self, at: CanonicalTimestamp) -> bool {
        at >= self.valid_from && self.valid_to.map_or(true, |end| at < end)
    }
}

impl<P: Payload> Canonicalize for RecordEnvelope<P> {
    fn canonical_record(&self) -> CanonicalRecord {
        self.record_with(self.attestation.canonical_record())
    }
}

/// Caller-supplied content of the next revision.
#[derive(Debug, Clone)]
pub struct EnvelopeDraft<P> {
    /// Identifier of the logical record.
    pub verifiable_id: VerifiableId,
    /// Schema version to stamp.
    pub schema_version: SchemaVersion,
    /// Time of this revision; becomes `lastUpdatedAt` and the attestation time.
    pub recorded_at: CanonicalTimestamp,
    /// Start of validity; defaults to the prior revision's, or `recorded_at` for revision 1.
    pub valid_from: Option<CanonicalTimestamp>,
    /// End of validity.
    pub valid_to: Option<CanonicalTimestamp>,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Record body.
    pub payload: P,
}

impl<P: Payload> EnvelopeDraft<P> {
    /// Draft with `ACTIVE` status and the current schema version.
    pub fn new(verifiable_id: VerifiableId, payload: P, recorded_at: CanonicalTimestamp) -> Self {
        Self {
            verifiable_id,
            schema_version: SchemaVersion::current(),
            recorded_at,
            valid_from: None,
            valid_to: None,
            status: RecordStatus::active(),
            payload,
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the start of validity.
    pub fn with_valid_from(mut self, at: CanonicalTimestamp) -> Self {
        self.valid_from = Some(at);
        self
    }

    /// Marks the record superseded as of `at`: sets `validTo` and `SUPERSEDED` status.
    pub fn superseded(mut self, at: CanonicalTimestamp) -> Self {
        self.valid_to = Some(at);
        self.status = RecordStatus::new(StatusCode::Superseded).effective(at);
        self
    }
}

/// Assembles the next revision of a record and attaches an attestation.
///
/// Without `prior` the result is revision 1 with a null previous hash.
/// With `prior` the result is revision `n + 1` pointing at the prior record
/// hash, and a draft that changes nothing substantive is rejected.
pub fn assemble_envelope<P: Payload>(
    draft: EnvelopeDraft<P>,
    prior: Option<&RecordEnvelope<P>>,
    attestor: &dyn Attestor,
) -> Result<RecordEnvelope<P>, CoreError> {
    if draft.verifiable_id.kind() != P::KIND {
        return Err(CoreError::KindMismatch {
            payload: P::KIND,
            identifier: draft.verifiable_id.kind(),
        });
    }
    draft.payload.validate()?;

    let (revision_number, previous_record_hash, first_seen_at, valid_from) = match prior {
        None => (
            1,
            None,
            draft.recorded_at,
            draft.valid_from.unwrap_or(draft.recorded_at),
        ),
        Some(prior) => {
            if prior.verifiable_id != draft.verifiable_id {
                return Err(ChainIntegrityError::IdentifierChanged {
                    expected: prior.verifiable_id.clone(),
                    found: draft.verifiable_id,
                }
                .into());
            }
            let revision_number = next_revision_number(prior)?;
            (
                revision_number,
                Some(prior.record_hash()?),
                prior.first_seen_at,
                draft.valid_from.unwrap_or(prior.valid_from),
            )
        }
    };

    let mut envelope = RecordEnvelope {
        record_kind: P::KIND,
        verifiable_id: draft.verifiable_id,
        schema_version: draft.schema_version,
        revision_number,
        first_seen_at,
        last_updated_at: draft.recorded_at,
        valid_from,
        valid_to: draft.valid_to,
        status: draft.status,
        previous_record_hash,
        attestation: attestor.unsigned(draft.recorded_at),
        payload: draft.payload,
    };

    if let Some(prior) = prior {
        if !envelope.differs_substantively(prior)? {
            tracing::warn!(
                verifiable_id = %envelope.verifiable_id,
                revision = envelope.revision_number,
                "revision rejected: no substantive change"
            );
            return Err(ChainIntegrityError::NoSubstantiveChange {
                verifiable_id: envelope.verifiable_id,
                revision: revision_number,
            }
            .into());
        }
    }

    envelope.attestation.proof_value = attestor.prove(&envelope.signing_bytes()?);
    tracing::debug!(
        verifiable_id = %envelope.verifiable_id,
        revision = envelope.revision_number,
        proof_type = %envelope.attestation.proof_type,
        "envelope assembled"
    );
    Ok(envelope)
}
