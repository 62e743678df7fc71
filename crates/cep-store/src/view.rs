//! Views over stored revisions: addressing and linkage navigation.
//!
//! These functions scan a reader sequentially; there is no index.

use crate::error::StoreError;
use crate::traits::StoreReader;
use crate::typed::{parse_envelope, TypedEnvelope};
use cep_core::{ExchangePayload, RecordEnvelope, RelationshipPayload, VerifiableId};

/// Finds the revision addressed by `(verifiable_id, revision_number)`.
pub fn resolve_revision<R: StoreReader>(
    reader: &mut R,
    verifiable_id: &VerifiableId,
    revision_number: u64,
) -> Result<Option<TypedEnvelope>, StoreError> {
    let wanted = verifiable_id.to_string();
    while let Some(envelope) = reader.read_next()? {
        if envelope.get("verifiableId").and_then(|v| v.as_str()) == Some(wanted.as_str())
            && envelope.get("revisionNumber").and_then(|v| v.as_u64()) == Some(revision_number)
        {
            return Ok(Some(parse_envelope(&envelope)?));
        }
    }
    Ok(None)
}

/// Collects exchange revisions that execute a relationship.
pub fn exchanges_for_relationship<R: StoreReader>(
    reader: &mut R,
    relationship_id: &VerifiableId,
) -> Result<Vec<RecordEnvelope<ExchangePayload>>, StoreError> {
    let mut exchanges = Vec::new();
    while let Some(envelope) = reader.read_next()? {
        if let TypedEnvelope::Exchange(exchange) = parse_envelope(&envelope)? {
            if exchange.payload.related_relationship_id.as_ref() == Some(relationship_id) {
                exchanges.push(exchange);
            }
        }
    }
    Ok(exchanges)
}

/// Collects exchange revisions whose provenance names `parent_exchange_id` as parent.
pub fn derived_exchanges<R: StoreReader>(
    reader: &mut R,
    parent_exchange_id: &VerifiableId,
) -> Result<Vec<RecordEnvelope<ExchangePayload>>, StoreError> {
    let mut children = Vec::new();
    while let Some(envelope) = reader.read_next()? {
        if let TypedEnvelope::Exchange(exchange) = parse_envelope(&envelope)? {
            let parent = exchange
                .payload
                .provenance
                .as_ref()
                .and_then(|chain| chain.parent_exchange_id.as_ref());
            if parent == Some(parent_exchange_id) {
                children.push(exchange);
            }
        }
    }
    Ok(children)
}

/// Collects relationship revisions that bind an entity.
pub fn relationships_for_entity<R: StoreReader>(
    reader: &mut R,
    entity_id: &VerifiableId,
) -> Result<Vec<RecordEnvelope<RelationshipPayload>>, StoreError> {
    let mut relationships = Vec::new();
    while let Some(envelope) = reader.read_next()? {
        if let TypedEnvelope::Relationship(relationship) = parse_envelope(&envelope)? {
            if relationship.payload.parties.includes(entity_id) {
                relationships.push(relationship);
            }
        }
    }
    Ok(relationships)
}
