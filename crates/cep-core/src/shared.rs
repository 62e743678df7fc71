use cep_canonical::{CanonicalRecord, Canonicalize, FieldValue, UriRef};
use serde::{Deserialize, Serialize};

use crate::identity::{RecordKind, VerifiableId};
use crate::errors::CoreError;

/// Pointer to the source-system record a payload was derived from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    /// Source system.
    pub source_system_uri: UriRef,
    /// Record identifier within the source system.
    pub source_record_id: String,
    /// Optional link to the source record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl SourceReference {
    /// Reference without a URL.
    pub fn new(source_system_uri: UriRef, source_record_id: impl Into<String>) -> Self {
        Self {
            source_system_uri,
            source_record_id: source_record_id.into(),
            source_url: None,
        }
    }
}

impl Canonicalize for SourceReference {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("sourceSystemUri", self.source_system_uri.as_str())
            .insert("sourceRecordId", self.source_record_id.as_str())
            .insert_if_present("sourceUrl", self.source_url.as_deref());
        record
    }
}

/// Renders source references as an unordered set.
pub(crate) fn source_reference_set(references: &[SourceReference]) -> FieldValue {
    FieldValue::Set(
        references
            .iter()
            .map(|reference| FieldValue::Record(reference.canonical_record()))
            .collect(),
    )
}

/// Requires an identifier of a given record kind.
pub(crate) fn expect_kind(
    field: &str,
    id: &VerifiableId,
    kind: RecordKind,
) -> Result<(), CoreError> {
    if id.kind() != kind {
        return Err(CoreError::InvalidPayload(format!(
            "{} must be a {} identifier, found {}",
            field, kind, id
        )));
    }
    Ok(())
}
