use cep_canonical::{
    Amount, CanonicalRecord, CanonicalTimestamp, Canonicalize, CurrencyCode, FieldValue, Share,
    UriRef,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::envelope::Payload;
use crate::errors::CoreError;
use crate::identity::{CanonicalInput, RecordKind, VerifiableId};
use crate::shared::{expect_kind, source_reference_set, SourceReference};

/// One side of a bilateral relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Entity identifier.
    pub entity_id: VerifiableId,
    /// Role of the entity.
    pub role_uri: UriRef,
}

impl Canonicalize for Party {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("entityId", self.entity_id.to_string())
            .insert("roleUri", self.role_uri.as_str());
        record
    }
}

/// Member of a multilateral relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Entity identifier.
    pub entity_id: VerifiableId,
    /// Role of the member.
    pub role_uri: UriRef,
    /// Share of participation, four decimal places.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participation_share: Option<Share>,
}

impl Canonicalize for Member {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("entityId", self.entity_id.to_string())
            .insert("roleUri", self.role_uri.as_str())
            .insert_if_present("participationShare", self.participation_share);
        record
    }
}

/// Who the relationship binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Parties {
    /// Two parties with directionality.
    Bilateral {
        /// First party, typically the grantor or buyer.
        party_a: Party,
        /// Second party.
        party_b: Party,
    },
    /// Unordered member set.
    Multilateral {
        /// Members; order carries no meaning.
        members: Vec<Member>,
    },
}

impl Parties {
    fn validate(&self) -> Result<(), CoreError> {
        match self {
            Parties::Bilateral { party_a, party_b } => {
                expect_kind("partyA", &party_a.entity_id, RecordKind::Entity)?;
                expect_kind("partyB", &party_b.entity_id, RecordKind::Entity)
            }
            Parties::Multilateral { members } => {
                let mut seen = BTreeSet::new();
                if let Some(repeated) = members.iter().find(|m| !seen.insert(&m.entity_id)) {
                    return Err(CoreError::InvalidPayload(format!(
                        "multilateral member {} is listed more than once",
                        repeated.entity_id
                    )));
                }
                if members.len() < 2 {
                    return Err(CoreError::InvalidPayload(
                        "multilateral relationship needs at least two members".to_string(),
                    ));
                }
                for member in members {
                    expect_kind("member", &member.entity_id, RecordKind::Entity)?;
                }
                validate_shares(members)
            }
        }
    }

    fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self {
            Parties::Bilateral { party_a, party_b } => {
                vec![party_a.entity_id.to_string(), party_b.entity_id.to_string()]
            }
            Parties::Multilateral { members } => members
                .iter()
                .map(|member| member.entity_id.to_string())
                .collect(),
        };
        if matches!(self, Parties::Multilateral { .. }) {
            ids.sort();
            ids.dedup();
        }
        ids
    }

    /// True when `entity_id` is a party or member.
    pub fn includes(&self, entity_id: &VerifiableId) -> bool {
        match self {
            Parties::Bilateral { party_a, party_b } => {
                party_a.entity_id == *entity_id || party_b.entity_id == *entity_id
            }
            Parties::Multilateral { members } => {
                members.iter().any(|member| member.entity_id == *entity_id)
            }
        }
    }
}

/// Shares, if any member has one, must be present on every member and sum to exactly 1.
fn validate_shares(members: &[Member]) -> Result<(), CoreError> {
    let shares: Vec<Share> = members.iter().filter_map(|m| m.participation_share).collect();
    if shares.is_empty() {
        return Ok(());
    }
    if shares.len() != members.len() {
        return Err(CoreError::InvalidPayload(
            "all members must carry a participation share if any do".to_string(),
        ));
    }
    let total = shares
        .into_iter()
        .try_fold(Share::ZERO, Share::checked_add)
        .ok_or_else(|| CoreError::InvalidPayload("participation shares overflow".to_string()))?;
    if total != Share::one() {
        return Err(CoreError::InvalidPayload(format!(
            "participation shares must sum to 1.0000, got {}",
            total
        )));
    }
    Ok(())
}

/// Money terms of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTerms {
    /// Total value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Amount>,
    /// Value obligated so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obligated_value: Option<Amount>,
    /// Currency.
    pub currency_code: CurrencyCode,
}

impl Canonicalize for FinancialTerms {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("currencyCode", self.currency_code.as_str())
            .insert_if_present("totalValue", self.total_value)
            .insert_if_present("obligatedValue", self.obligated_value);
        record
    }
}

/// Body of a relationship record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipPayload {
    /// Relationship type from a controlled vocabulary.
    pub relationship_type_uri: UriRef,
    /// Bound parties.
    pub parties: Parties,
    /// Relationship this one derives from (sub-award, task order).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_relationship_id: Option<VerifiableId>,
    /// When the relationship takes effect.
    pub effective_timestamp: CanonicalTimestamp,
    /// When it ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<CanonicalTimestamp>,
    /// Money terms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_terms: Option<FinancialTerms>,
    /// Other terms as key/value attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub terms: BTreeMap<String, String>,
    /// Source-system records; order carries no meaning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_references: Vec<SourceReference>,
}

impl RelationshipPayload {
    /// Bilateral relationship.
    pub fn bilateral(
        relationship_type_uri: UriRef,
        party_a: Party,
        party_b: Party,
        effective_timestamp: CanonicalTimestamp,
    ) -> Self {
        Self::with_parties(
            relationship_type_uri,
            Parties::Bilateral { party_a, party_b },
            effective_timestamp,
        )
    }

    /// Multilateral relationship.
    pub fn multilateral(
        relationship_type_uri: UriRef,
        members: Vec<Member>,
        effective_timestamp: CanonicalTimestamp,
    ) -> Self {
        Self::with_parties(
            relationship_type_uri,
            Parties::Multilateral { members },
            effective_timestamp,
        )
    }

    fn with_parties(
        relationship_type_uri: UriRef,
        parties: Parties,
        effective_timestamp: CanonicalTimestamp,
    ) -> Self {
        Self {
            relationship_type_uri,
            parties,
            parent_relationship_id: None,
            effective_timestamp,
            expiration_timestamp: None,
            financial_terms: None,
            terms: BTreeMap::new(),
            source_references: Vec::new(),
        }
    }

    /// Sets the parent relationship.
    pub fn with_parent(mut self, parent: VerifiableId) -> Self {
        self.parent_relationship_id = Some(parent);
        self
    }

    /// Sets the financial terms.
    pub fn with_financial_terms(mut self, terms: FinancialTerms) -> Self {
        self.financial_terms = Some(terms);
        self
    }

    /// Adds a source reference.
    pub fn with_source(mut self, reference: SourceReference) -> Self {
        self.source_references.push(reference);
        self
    }

    /// Identity-bearing fields: type, parties, parent, and effective time.
    pub fn canonical_input(&self) -> CanonicalInput {
        let mut input = CanonicalInput::new(RecordKind::Relationship);
        input
            .trusted("relationshipTypeUri", self.relationship_type_uri.as_str())
            .trusted("parties", self.parties.entity_ids().join(","))
            .trusted("effectiveTimestamp", self.effective_timestamp.to_canonical_string());
        if let Some(parent) = &self.parent_relationship_id {
            input.trusted("parentRelationshipId", parent.to_string());
        }
        input
    }
}

impl Canonicalize for RelationshipPayload {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record.insert("relationshipTypeUri", self.relationship_type_uri.as_str());
        match &self.parties {
            Parties::Bilateral { party_a, party_b } => {
                let mut parties = CanonicalRecord::new();
                parties
                    .insert("partyA", party_a.canonical_record())
                    .insert("partyB", party_b.canonical_record());
                record.insert("bilateralParties", parties);
            }
            Parties::Multilateral { members } => {
                record.insert(
                    "members",
                    FieldValue::Set(
                        members
                            .iter()
                            .map(|member| FieldValue::Record(member.canonical_record()))
                            .collect(),
                    ),
                );
            }
        }
        record
            .insert_if_present(
                "parentRelationshipId",
                self.parent_relationship_id.as_ref().map(ToString::to_string),
            )
            .insert("effectiveTimestamp", self.effective_timestamp)
            .insert_if_present("expirationTimestamp", self.expiration_timestamp)
            .insert_if_present(
                "financialTerms",
                self.financial_terms.as_ref().map(|terms| terms.canonical_record()),
            );
        if !self.terms.is_empty() {
            let mut terms = CanonicalRecord::new();
            for (key, value) in &self.terms {
                terms.insert(key.as_str(), value.as_str());
            }
            record.insert("terms", terms);
        }
        if !self.source_references.is_empty() {
            record.insert("sourceReferences", source_reference_set(&self.source_references));
        }
        record
    }
}

impl Payload for RelationshipPayload {
    const KIND: RecordKind = RecordKind::Relationship;

    fn validate(&self) -> Result<(), CoreError> {
        self.parties.validate()?;
        if let Some(parent) = &self.parent_relationship_id {
            expect_kind("parentRelationshipId", parent, RecordKind::Relationship)?;
        }
        if let Some(expiration) = self.expiration_timestamp {
            if expiration < self.effective_timestamp {
                return Err(CoreError::InvalidPayload(
                    "expiration precedes effective timestamp".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn parent_id(&self) -> Option<&VerifiableId> {
        self.parent_relationship_id.as_ref()
    }
}
