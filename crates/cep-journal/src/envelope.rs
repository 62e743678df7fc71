use serde_json::Value;

/// Untyped envelope JSON as stored in an envelope frame.
///
/// The journal stores envelopes exactly as serialized by `cep-core`; typed
/// reads deserialize into `RecordEnvelope<P>`.
pub type EnvelopeJson = Value;

const ENVELOPE_FIELDS: [&str; 7] = [
    "recordKind",
    "verifiableId",
    "schemaVersion",
    "revisionNumber",
    "previousRecordHash",
    "attestation",
    "payload",
];

/// Returns the first envelope field missing from `value`, if any.
pub fn missing_envelope_field(value: &EnvelopeJson) -> Option<&'static str> {
    let Some(obj) = value.as_object() else {
        return Some("recordKind");
    };
    ENVELOPE_FIELDS
        .iter()
        .copied()
        .find(|field| !obj.contains_key(*field))
}

/// `(verifiableId, revisionNumber)` address of an envelope.
pub fn envelope_address(value: &EnvelopeJson) -> Option<(&str, u64)> {
    Some((
        value.get("verifiableId")?.as_str()?,
        value.get("revisionNumber")?.as_u64()?,
    ))
}
