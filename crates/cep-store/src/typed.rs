//! Typed envelope parsing from JSON.

use cep_core::{EntityPayload, ExchangePayload, RecordEnvelope, RecordKind, RelationshipPayload};
use cep_journal::EnvelopeJson;
use thiserror::Error;

/// Error raised when parsing an envelope.
#[derive(Error, Debug)]
pub enum ParseError {
    /// JSON deserialization error.
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Envelope with its payload resolved by record kind.
#[derive(Debug, Clone)]
pub enum TypedEnvelope {
    /// Entity revision.
    Entity(RecordEnvelope<EntityPayload>),
    /// Relationship revision.
    Relationship(RecordEnvelope<RelationshipPayload>),
    /// Exchange revision.
    Exchange(RecordEnvelope<ExchangePayload>),
    /// Unrecognized `recordKind`.
    Unknown(EnvelopeJson),
}

impl TypedEnvelope {
    /// Record kind, if recognized.
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            TypedEnvelope::Entity(_) => Some(RecordKind::Entity),
            TypedEnvelope::Relationship(_) => Some(RecordKind::Relationship),
            TypedEnvelope::Exchange(_) => Some(RecordKind::Exchange),
            TypedEnvelope::Unknown(_) => None,
        }
    }
}

/// Parses envelope JSON into a typed envelope.
///
/// The `recordKind` field selects the payload type. A recognized kind whose
/// payload does not deserialize is an error; an unrecognized kind yields
/// [`TypedEnvelope::Unknown`].
pub fn parse_envelope(json: &EnvelopeJson) -> Result<TypedEnvelope, ParseError> {
    let kind = json
        .get("recordKind")
        .and_then(|v| v.as_str())
        .and_then(|v| RecordKind::parse(v).ok());

    Ok(match kind {
        Some(RecordKind::Entity) => TypedEnvelope::Entity(serde_json::from_value(json.clone())?),
        Some(RecordKind::Relationship) => {
            TypedEnvelope::Relationship(serde_json::from_value(json.clone())?)
        }
        Some(RecordKind::Exchange) => TypedEnvelope::Exchange(serde_json::from_value(json.clone())?),
        None => TypedEnvelope::Unknown(json.clone()),
    })
}
