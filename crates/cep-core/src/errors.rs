use thiserror::Error;

use crate::chain::ChainIntegrityError;
use crate::provenance::ProvenanceError;
use crate::resolver::ResolveError;

/// Core error types.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A field could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalize(#[from] cep_canonical::CanonicalizeError),
    /// A record could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] cep_canonical::SerializeError),
    /// A value failed validation.
    #[error("invalid value: {0}")]
    Validation(#[from] cep_canonical::ValidationError),
    /// Identifier claims could not be merged.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A revision does not extend its chain.
    #[error(transparent)]
    Chain(#[from] ChainIntegrityError),
    /// Provenance links do not compose.
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),
    /// Payload violates its own invariants.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// Payload kind does not match the identifier's record kind.
    #[error("payload kind {payload} does not match identifier kind {identifier}")]
    KindMismatch {
        /// Kind of the payload type.
        payload: crate::identity::RecordKind,
        /// Kind prefix of the identifier.
        identifier: crate::identity::RecordKind,
    },
}
