use cep_canonical::{CanonicalRecord, Canonicalize, Canonicalizer, JurisdictionCode, UriRef};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::envelope::Payload;
use crate::errors::CoreError;
use crate::identity::{compute_verifiable_id, CanonicalInput, EntityIdentity, RecordKind, VerifiableId};
use crate::resolver::IdentifierSet;

static NAICS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{2,6}$").expect("invalid regex"));

/// Body of an entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPayload {
    /// Legal name as supplied.
    pub legal_name: String,
    /// Canonical form of the legal name.
    pub legal_name_normalized: String,
    /// Jurisdiction of registration.
    pub jurisdiction_iso: JurisdictionCode,
    /// Entity type from a controlled vocabulary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type_uri: Option<UriRef>,
    /// Merged external identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<IdentifierSet>,
    /// Industry classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naics_code: Option<String>,
}

impl EntityPayload {
    /// Canonicalizes an entity's identity and derives its identifier and payload together.
    pub fn from_identity(
        canonicalizer: &Canonicalizer,
        identity: &EntityIdentity,
    ) -> Result<(VerifiableId, EntityPayload), CoreError> {
        let input = CanonicalInput::entity(canonicalizer, identity)?;
        let verifiable_id = compute_verifiable_id(&input)?;
        let jurisdiction = canonicalizer.canonicalize_field(
            "jurisdiction",
            identity.jurisdiction.as_deref(),
            cep_canonical::FieldKind::Jurisdiction,
            "base",
        )?;
        let payload = EntityPayload {
            legal_name: identity.legal_name.clone().unwrap_or_default(),
            legal_name_normalized: input.get("legalName").unwrap_or_default().to_string(),
            jurisdiction_iso: JurisdictionCode::parse(jurisdiction)?,
            entity_type_uri: None,
            identifiers: None,
            naics_code: None,
        };
        Ok((verifiable_id, payload))
    }

    /// Sets the entity type.
    pub fn with_entity_type(mut self, uri: UriRef) -> Self {
        self.entity_type_uri = Some(uri);
        self
    }

    /// Attaches merged identifiers.
    pub fn with_identifiers(mut self, identifiers: IdentifierSet) -> Self {
        self.identifiers = Some(identifiers);
        self
    }

    /// Sets the NAICS code.
    pub fn with_naics(mut self, code: impl Into<String>) -> Self {
        self.naics_code = Some(code.into());
        self
    }
}

impl Canonicalize for EntityPayload {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("legalName", self.legal_name.as_str())
            .insert("legalNameNormalized", self.legal_name_normalized.as_str())
            .insert("jurisdictionIso", self.jurisdiction_iso.as_str())
            .insert_if_present("entityTypeUri", self.entity_type_uri.as_ref().map(UriRef::as_str))
            .insert_if_present(
                "identifiers",
                self.identifiers.as_ref().map(|set| set.canonical_record()),
            )
            .insert_if_present("naicsCode", self.naics_code.as_deref());
        record
    }
}

impl Payload for EntityPayload {
    const KIND: RecordKind = RecordKind::Entity;

    fn validate(&self) -> Result<(), CoreError> {
        if self.legal_name.trim().is_empty() || self.legal_name_normalized.is_empty() {
            return Err(CoreError::InvalidPayload("legal name is empty".to_string()));
        }
        if let Some(code) = &self.naics_code {
            if !NAICS.is_match(code) {
                return Err(CoreError::InvalidPayload(format!("invalid NAICS code '{}'", code)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_normalized_name() {
        let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
        let (id, payload) = EntityPayload::from_identity(
            &canonicalizer,
            &EntityIdentity::new("MTA Bus Co.", "us-ny"),
        )
        .unwrap();
        assert_eq!(id.kind(), RecordKind::Entity);
        assert_eq!(payload.jurisdiction_iso.as_str(), "US-NY");
        assert_eq!(
            payload.legal_name_normalized,
            "metropolitan transportation authority bus company"
        );
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn malformed_naics_is_rejected() {
        let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
        let (_, payload) =
            EntityPayload::from_identity(&canonicalizer, &EntityIdentity::new("Acme", "US"))
                .unwrap();
        assert!(payload.with_naics("61-11").validate().is_err());
    }
}
