use cep_canonical::{
    CanonicalHash, CanonicalRecord, CanonicalizeError, Canonicalizer, FieldKind, JurisdictionCode,
    ValidationError,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::CoreError;

static SCHEME_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,31}$").expect("invalid regex"));

/// Scheme tag used for entity identifiers derived from the SNFEI layout.
pub const SNFEI_SCHEME: &str = "snfei";
/// Scheme tag used for relationship and exchange identifiers.
pub const SHA256_SCHEME: &str = "sha256";

/// Record kind discriminator shared by identifiers and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Organization or other civic entity.
    #[serde(rename = "cep-entity")]
    Entity,
    /// Relationship between entities (contract, grant, membership).
    #[serde(rename = "cep-relationship")]
    Relationship,
    /// Transfer of value between entities.
    #[serde(rename = "cep-exchange")]
    Exchange,
}

impl RecordKind {
    /// Wire name (`cep-entity`, `cep-relationship`, `cep-exchange`).
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Entity => "cep-entity",
            RecordKind::Relationship => "cep-relationship",
            RecordKind::Exchange => "cep-exchange",
        }
    }

    /// Parses a wire name.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "cep-entity" => Ok(RecordKind::Entity),
            "cep-relationship" => Ok(RecordKind::Relationship),
            "cep-exchange" => Ok(RecordKind::Exchange),
            other => Err(ValidationError::PatternMismatch {
                field: "recordKind",
                value: other.to_string(),
            }),
        }
    }

    /// Scheme used when deriving identifiers for this kind.
    pub fn default_scheme(self) -> &'static str {
        match self {
            RecordKind::Entity => SNFEI_SCHEME,
            RecordKind::Relationship | RecordKind::Exchange => SHA256_SCHEME,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheme-tagged, content-derived identifier: `{recordKind}:{scheme}:{hashValue}`.
///
/// Created once per logical record and never recomputed from amended data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerifiableId {
    kind: RecordKind,
    scheme: String,
    hash: CanonicalHash,
}

impl VerifiableId {
    /// Assembles an identifier from its parts.
    pub fn new(
        kind: RecordKind,
        scheme: impl Into<String>,
        hash: CanonicalHash,
    ) -> Result<Self, ValidationError> {
        let scheme = scheme.into();
        if !SCHEME_NAME.is_match(&scheme) {
            return Err(ValidationError::PatternMismatch {
                field: "scheme",
                value: scheme,
            });
        }
        Ok(Self { kind, scheme, hash })
    }

    /// Parses `{recordKind}:{scheme}:{hashValue}`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let mismatch = || ValidationError::PatternMismatch {
            field: "verifiableId",
            value: value.to_string(),
        };
        let mut parts = value.splitn(3, ':');
        let (Some(kind), Some(scheme), Some(hash)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(mismatch());
        };
        let kind = RecordKind::parse(kind).map_err(|_| mismatch())?;
        let hash = CanonicalHash::parse(hash).map_err(|_| mismatch())?;
        Self::new(kind, scheme, hash).map_err(|_| mismatch())
    }

    /// Record kind prefix.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Scheme tag.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Hash value.
    pub fn hash(&self) -> &CanonicalHash {
        &self.hash
    }
}

impl fmt::Display for VerifiableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.scheme, self.hash)
    }
}

impl TryFrom<String> for VerifiableId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VerifiableId> for String {
    fn from(value: VerifiableId) -> Self {
        value.to_string()
    }
}

/// Raw identity-bearing fields of an entity, as supplied by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdentity {
    /// Legal or registered name.
    pub legal_name: Option<String>,
    /// ISO 3166 jurisdiction (`US`, `US-CA`); also selects the rule tables.
    pub jurisdiction: Option<String>,
    /// Street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Registration or formation date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<String>,
}

impl EntityIdentity {
    /// Identity with the two required fields.
    pub fn new(legal_name: impl Into<String>, jurisdiction: impl Into<String>) -> Self {
        Self {
            legal_name: Some(legal_name.into()),
            jurisdiction: Some(jurisdiction.into()),
            address: None,
            registration_date: None,
        }
    }

    /// Sets the address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the registration date.
    pub fn with_registration_date(mut self, date: impl Into<String>) -> Self {
        self.registration_date = Some(date.into());
        self
    }
}

/// Normalized identity-bearing fields of one record, ready for hashing.
///
/// Values only enter through the canonicalizer or as already-canonical
/// identifiers, so equal inputs always hash equally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalInput {
    kind: RecordKind,
    fields: BTreeMap<String, String>,
}

impl CanonicalInput {
    /// Empty input for a record kind.
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Canonicalizes an entity's identity fields.
    ///
    /// The jurisdiction selects the rule tables for the name and address and
    /// contributes its country code to the identity.
    pub fn entity(
        canonicalizer: &Canonicalizer,
        identity: &EntityIdentity,
    ) -> Result<Self, CanonicalizeError> {
        let jurisdiction = canonicalizer.canonicalize_field(
            "jurisdiction",
            identity.jurisdiction.as_deref(),
            FieldKind::Jurisdiction,
            "base",
        )?;
        let country = JurisdictionCode::parse(jurisdiction.as_str())
            .map_err(|err| CanonicalizeError::InvalidFieldValue {
                field: "jurisdiction".to_string(),
                value: jurisdiction.clone(),
                reason: err.to_string(),
            })?
            .country();

        let mut input = Self::new(RecordKind::Entity);
        input
            .required(
                canonicalizer,
                "legalName",
                identity.legal_name.as_deref(),
                FieldKind::LegalName,
                &jurisdiction,
            )?
            .optional(
                canonicalizer,
                "address",
                identity.address.as_deref(),
                FieldKind::Address,
                &jurisdiction,
            )?
            .optional(
                canonicalizer,
                "registrationDate",
                identity.registration_date.as_deref(),
                FieldKind::RegistrationDate,
                &jurisdiction,
            )?
            .trusted("countryCode", country.as_str());
        Ok(input)
    }

    /// Canonicalizes and inserts a required field.
    pub fn required(
        &mut self,
        canonicalizer: &Canonicalizer,
        field: &str,
        value: Option<&str>,
        kind: FieldKind,
        locale: &str,
    ) -> Result<&mut Self, CanonicalizeError> {
        let canonical = canonicalizer.canonicalize_field(field, value, kind, locale)?;
        self.fields.insert(field.to_string(), canonical);
        Ok(self)
    }

    /// Canonicalizes and inserts an optional field; absent or blank values leave it out.
    pub fn optional(
        &mut self,
        canonicalizer: &Canonicalizer,
        field: &str,
        value: Option<&str>,
        kind: FieldKind,
        locale: &str,
    ) -> Result<&mut Self, CanonicalizeError> {
        let Some(value) = value else {
            return Ok(self);
        };
        match canonicalizer.canonicalize_field(field, Some(value), kind, locale) {
            Ok(canonical) => {
                self.fields.insert(field.to_string(), canonical);
                Ok(self)
            }
            Err(CanonicalizeError::MissingIdentityField(_)) => Ok(self),
            Err(err) => Err(err),
        }
    }

    /// Inserts a value that is canonical by construction (identifiers, timestamps, URIs).
    pub fn trusted(&mut self, field: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Record kind this input identifies.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Looks up a normalized field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// All normalized fields in canonical order.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Bytes hashed into the identifier.
    ///
    /// Entities use the pipe-joined SNFEI layout
    /// `legalName|address|countryCode|registrationDate`; other kinds use the
    /// canonical serialization of their fields.
    pub fn hash_input(&self) -> Result<String, CoreError> {
        match self.kind {
            RecordKind::Entity => {
                if !self.fields.contains_key("legalName") {
                    return Err(CanonicalizeError::MissingIdentityField("legalName".to_string()).into());
                }
                let part = |key: &str| self.get(key).unwrap_or_default();
                Ok([
                    part("legalName"),
                    part("address"),
                    part("countryCode"),
                    part("registrationDate"),
                ]
                .join("|"))
            }
            RecordKind::Relationship | RecordKind::Exchange => {
                if self.fields.is_empty() {
                    return Err(CoreError::InvalidPayload(format!(
                        "{} identity has no fields",
                        self.kind
                    )));
                }
                let mut record = CanonicalRecord::new();
                for (key, value) in &self.fields {
                    record.insert(key.as_str(), value.as_str());
                }
                Ok(record.to_canonical_string()?)
            }
        }
    }
}

/// Derives the verifiable identifier for a canonical input.
///
/// Formula: `{recordKind}:{scheme}:sha256(hash_input)`, lowercase hex.
pub fn compute_verifiable_id(input: &CanonicalInput) -> Result<VerifiableId, CoreError> {
    let hash = CanonicalHash::of(input.hash_input()?.as_bytes());
    Ok(VerifiableId::new(input.kind(), input.kind().default_scheme(), hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonicalizer() -> Canonicalizer {
        Canonicalizer::with_builtin_rules().unwrap()
    }

    #[test]
    fn verifiable_id_round_trips_through_string() {
        let id = VerifiableId::new(
            RecordKind::Entity,
            SNFEI_SCHEME,
            CanonicalHash::of(b"x"),
        )
        .unwrap();
        let text = id.to_string();
        assert!(text.starts_with("cep-entity:snfei:"));
        assert_eq!(VerifiableId::parse(&text).unwrap(), id);
    }

    #[test]
    fn malformed_verifiable_ids_are_rejected() {
        assert!(VerifiableId::parse("cep-entity:snfei").is_err());
        assert!(VerifiableId::parse("cep-thing:snfei:00").is_err());
        assert!(VerifiableId::parse(&format!("cep-entity:SNFEI:{}", "0".repeat(64))).is_err());
    }

    #[test]
    fn entity_hash_input_uses_pipe_layout() {
        let identity = EntityIdentity::new("Springfield USD", "us")
            .with_registration_date("1999");
        let input = CanonicalInput::entity(&canonicalizer(), &identity).unwrap();
        assert_eq!(
            input.hash_input().unwrap(),
            "springfield unified school district||US|1999-01-01"
        );
    }

    #[test]
    fn missing_legal_name_fails_before_hashing() {
        let identity = EntityIdentity {
            jurisdiction: Some("US".to_string()),
            ..EntityIdentity::default()
        };
        let err = CanonicalInput::entity(&canonicalizer(), &identity).unwrap_err();
        assert!(matches!(err, CanonicalizeError::MissingIdentityField(field) if field == "legalName"));
    }

    #[test]
    fn blank_optional_fields_are_left_out() {
        let identity = EntityIdentity::new("Acme Inc", "US").with_address("   ");
        let input = CanonicalInput::entity(&canonicalizer(), &identity).unwrap();
        assert_eq!(input.get("address"), None);
    }

    #[test]
    fn equivalent_entities_share_an_identifier() {
        let c = canonicalizer();
        let a = CanonicalInput::entity(&c, &EntityIdentity::new("ACME, Inc.", "US-CA")).unwrap();
        let b = CanonicalInput::entity(&c, &EntityIdentity::new("  acme   incorporated ", "us_ca"))
            .unwrap();
        assert_eq!(
            compute_verifiable_id(&a).unwrap(),
            compute_verifiable_id(&b).unwrap()
        );
    }

    #[test]
    fn relationship_ids_use_sha256_scheme() {
        let mut input = CanonicalInput::new(RecordKind::Relationship);
        input.trusted("relationshipTypeUri", "https://example.org/grant");
        let id = compute_verifiable_id(&input).unwrap();
        assert_eq!(id.kind(), RecordKind::Relationship);
        assert_eq!(id.scheme(), SHA256_SCHEME);
    }
}
