use cep_canonical::{Amount, CanonicalRecord, CanonicalTimestamp, Canonicalize, CurrencyCode, UriRef};
use serde::{Deserialize, Serialize};

use crate::envelope::Payload;
use crate::errors::CoreError;
use crate::identity::{CanonicalInput, RecordKind, VerifiableId};
use crate::provenance::ProvenanceChain;
use crate::shared::{expect_kind, source_reference_set, SourceReference};

/// Source or recipient of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeParty {
    /// Entity identifier.
    pub entity_id: VerifiableId,
    /// Role of the entity in the exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_uri: Option<UriRef>,
    /// Account the value moved from or to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_identifier: Option<String>,
}

impl ExchangeParty {
    /// Party with an identifier only.
    pub fn new(entity_id: VerifiableId) -> Self {
        Self {
            entity_id,
            role_uri: None,
            account_identifier: None,
        }
    }
}

impl Canonicalize for ExchangeParty {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("entityId", self.entity_id.to_string())
            .insert_if_present("roleUri", self.role_uri.as_ref().map(UriRef::as_str))
            .insert_if_present("accountIdentifier", self.account_identifier.as_deref());
        record
    }
}

/// Value moved by an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeValue {
    /// Amount, two decimal places.
    pub amount: Amount,
    /// Currency.
    pub currency_code: CurrencyCode,
    /// Kind of value (monetary, in-kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type_uri: Option<UriRef>,
}

impl Canonicalize for ExchangeValue {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("amount", self.amount)
            .insert("currencyCode", self.currency_code.as_str())
            .insert_if_present("valueTypeUri", self.value_type_uri.as_ref().map(UriRef::as_str));
        record
    }
}

/// Reporting codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Categorization {
    /// Assistance listing number (`84.010`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfda_number: Option<String>,
    /// Industry code of the goods or services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naics_code: Option<String>,
    /// Treasury account symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtas_account_code: Option<String>,
    /// Jurisdiction-specific category code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_category_code: Option<String>,
    /// Label of the local category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_category_label: Option<String>,
}

impl Canonicalize for Categorization {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert_if_present("cfdaNumber", self.cfda_number.as_deref())
            .insert_if_present("naicsCode", self.naics_code.as_deref())
            .insert_if_present("gtasAccountCode", self.gtas_account_code.as_deref())
            .insert_if_present("localCategoryCode", self.local_category_code.as_deref())
            .insert_if_present("localCategoryLabel", self.local_category_label.as_deref());
        record
    }
}

/// Body of an exchange record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePayload {
    /// Exchange type from a controlled vocabulary.
    pub exchange_type_uri: UriRef,
    /// Where the value came from.
    pub source_entity: ExchangeParty,
    /// Where it went.
    pub recipient_entity: ExchangeParty,
    /// What moved.
    pub value: ExchangeValue,
    /// When it moved.
    pub occurred_timestamp: CanonicalTimestamp,
    /// Relationship the exchange executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_relationship_id: Option<VerifiableId>,
    /// Funding provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceChain>,
    /// Reporting codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorization: Option<Categorization>,
    /// Source-system records; order carries no meaning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_references: Vec<SourceReference>,
}

impl ExchangePayload {
    /// Exchange with the required fields.
    pub fn new(
        exchange_type_uri: UriRef,
        source_entity: ExchangeParty,
        recipient_entity: ExchangeParty,
        value: ExchangeValue,
        occurred_timestamp: CanonicalTimestamp,
    ) -> Self {
        Self {
            exchange_type_uri,
            source_entity,
            recipient_entity,
            value,
            occurred_timestamp,
            related_relationship_id: None,
            provenance: None,
            categorization: None,
            source_references: Vec::new(),
        }
    }

    /// Sets the relationship.
    pub fn with_relationship(mut self, relationship: VerifiableId) -> Self {
        self.related_relationship_id = Some(relationship);
        self
    }

    /// Sets the provenance.
    pub fn with_provenance(mut self, provenance: ProvenanceChain) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Sets the categorization.
    pub fn with_categorization(mut self, categorization: Categorization) -> Self {
        self.categorization = Some(categorization);
        self
    }

    /// Adds a source reference.
    pub fn with_source(mut self, reference: SourceReference) -> Self {
        self.source_references.push(reference);
        self
    }

    /// Identity-bearing fields: type, both parties, value, and occurrence time.
    pub fn canonical_input(&self) -> CanonicalInput {
        let mut input = CanonicalInput::new(RecordKind::Exchange);
        input
            .trusted("exchangeTypeUri", self.exchange_type_uri.as_str())
            .trusted("sourceEntityId", self.source_entity.entity_id.to_string())
            .trusted("recipientEntityId", self.recipient_entity.entity_id.to_string())
            .trusted("amount", self.value.amount.to_string())
            .trusted("currencyCode", self.value.currency_code.as_str())
            .trusted("occurredTimestamp", self.occurred_timestamp.to_canonical_string());
        if let Some(relationship) = &self.related_relationship_id {
            input.trusted("relatedRelationshipId", relationship.to_string());
        }
        input
    }
}

impl Canonicalize for ExchangePayload {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("exchangeTypeUri", self.exchange_type_uri.as_str())
            .insert("sourceEntity", self.source_entity.canonical_record())
            .insert("recipientEntity", self.recipient_entity.canonical_record())
            .insert("value", self.value.canonical_record())
            .insert("occurredTimestamp", self.occurred_timestamp)
            .insert_if_present(
                "relatedRelationshipId",
                self.related_relationship_id.as_ref().map(ToString::to_string),
            )
            .insert_if_present(
                "provenanceChain",
                self.provenance
                    .as_ref()
                    .filter(|chain| chain.has_any())
                    .map(|chain| chain.canonical_record()),
            )
            .insert_if_present(
                "categorization",
                self.categorization.as_ref().map(|codes| codes.canonical_record()),
            );
        if !self.source_references.is_empty() {
            record.insert("sourceReferences", source_reference_set(&self.source_references));
        }
        record
    }
}

impl Payload for ExchangePayload {
    const KIND: RecordKind = RecordKind::Exchange;

    fn validate(&self) -> Result<(), CoreError> {
        expect_kind("sourceEntity", &self.source_entity.entity_id, RecordKind::Entity)?;
        expect_kind("recipientEntity", &self.recipient_entity.entity_id, RecordKind::Entity)?;
        if let Some(relationship) = &self.related_relationship_id {
            expect_kind("relatedRelationshipId", relationship, RecordKind::Relationship)?;
        }
        if let Some(parent) = self.parent_id() {
            expect_kind("parentExchangeId", parent, RecordKind::Exchange)?;
        }
        Ok(())
    }

    fn parent_id(&self) -> Option<&VerifiableId> {
        self.provenance
            .as_ref()
            .and_then(|chain| chain.parent_exchange_id.as_ref())
    }
}
