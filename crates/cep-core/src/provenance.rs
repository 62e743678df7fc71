use cep_canonical::{CanonicalRecord, Canonicalize, FieldValue, UriRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::identity::VerifiableId;

/// Separator between funding-chain segments.
pub const CHAIN_SEPARATOR: &str = ">";

/// Provenance errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvenanceError {
    /// A tag segment is empty or contains the separator.
    #[error("invalid funding chain segment '{0}'")]
    InvalidSegment(String),
    /// The left link does not end where the right link starts.
    #[error("links do not meet: left ends at {left_end}, right starts at {right_start}")]
    Disjoint {
        /// Last node of the left link.
        left_end: String,
        /// First node of the right link.
        right_start: String,
    },
}

/// Ordered ancestry of a funding flow, rendered `FEDERAL>STATE>LOCAL`.
///
/// Concatenation is associative, so any grouping of the same hops yields
/// the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FundingChainTag(Vec<String>);

impl FundingChainTag {
    /// Tag with a single segment.
    pub fn root(segment: impl Into<String>) -> Result<Self, ProvenanceError> {
        Self::from_segments([segment.into()])
    }

    /// Tag from ordered segments.
    pub fn from_segments(
        segments: impl IntoIterator<Item = String>,
    ) -> Result<Self, ProvenanceError> {
        let segments: Vec<String> = segments
            .into_iter()
            .map(|segment| segment.trim().to_string())
            .collect();
        if segments.is_empty() {
            return Err(ProvenanceError::InvalidSegment(String::new()));
        }
        if let Some(bad) = segments
            .iter()
            .find(|segment| segment.is_empty() || segment.contains(CHAIN_SEPARATOR))
        {
            return Err(ProvenanceError::InvalidSegment(bad.clone()));
        }
        Ok(Self(segments))
    }

    /// Parses `A>B>C`.
    pub fn parse(value: &str) -> Result<Self, ProvenanceError> {
        Self::from_segments(value.split(CHAIN_SEPARATOR).map(str::to_string))
    }

    /// Tag of `self` followed by `next`.
    pub fn then(&self, next: &FundingChainTag) -> FundingChainTag {
        let mut segments = self.0.clone();
        segments.extend(next.0.iter().cloned());
        FundingChainTag(segments)
    }

    /// Appends one segment.
    pub fn extend(&self, segment: impl Into<String>) -> Result<FundingChainTag, ProvenanceError> {
        Ok(self.then(&FundingChainTag::root(segment)?))
    }

    /// Segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment.
    pub fn origin(&self) -> &str {
        &self.0[0]
    }

    /// Last segment.
    pub fn terminal(&self) -> &str {
        &self.0[self.0.len() - 1]
    }
}

impl fmt::Display for FundingChainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(CHAIN_SEPARATOR))
    }
}

impl TryFrom<String> for FundingChainTag {
    type Error = ProvenanceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FundingChainTag> for String {
    fn from(value: FundingChainTag) -> Self {
        value.to_string()
    }
}

/// A directed provenance edge between two nodes, with the path it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceLink {
    tag: FundingChainTag,
}

impl ProvenanceLink {
    /// Single hop `from -> to`.
    pub fn hop(from: impl Into<String>, to: impl Into<String>) -> Result<Self, ProvenanceError> {
        Ok(Self {
            tag: FundingChainTag::from_segments([from.into(), to.into()])?,
        })
    }

    /// Start node.
    pub fn from(&self) -> &str {
        self.tag.origin()
    }

    /// End node.
    pub fn to(&self) -> &str {
        self.tag.terminal()
    }

    /// Path covered, start to end.
    pub fn tag(&self) -> &FundingChainTag {
        &self.tag
    }

    /// Composes `self` then `next`, joining on the shared node.
    pub fn compose(&self, next: &ProvenanceLink) -> Result<ProvenanceLink, ProvenanceError> {
        if self.to() != next.from() {
            return Err(ProvenanceError::Disjoint {
                left_end: self.to().to_string(),
                right_start: next.from().to_string(),
            });
        }
        let mut segments = self.tag.segments().to_vec();
        segments.extend(next.tag.segments()[1..].iter().cloned());
        Ok(ProvenanceLink {
            tag: FundingChainTag(segments),
        })
    }
}

/// Entity a flow of value passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntermediaryEntity {
    /// Entity identifier.
    pub entity_id: VerifiableId,
    /// Role in the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_uri: Option<UriRef>,
}

impl Canonicalize for IntermediaryEntity {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert("entityId", self.entity_id.to_string())
            .insert_if_present("roleUri", self.role_uri.as_ref().map(UriRef::as_str));
        record
    }
}

/// Where an exchange's value came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceChain {
    /// Derived ancestry tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_chain_tag: Option<FundingChainTag>,
    /// Original source of the funds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultimate_source_entity_id: Option<VerifiableId>,
    /// Entities the value passed through, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediary_entities: Vec<IntermediaryEntity>,
    /// Upstream exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_exchange_id: Option<VerifiableId>,
}

impl ProvenanceChain {
    /// Provenance of an exchange funded by `parent`, whose chain tag is extended by `segment`.
    pub fn derived_from(
        parent_exchange_id: VerifiableId,
        parent: Option<&ProvenanceChain>,
        segment: impl Into<String>,
    ) -> Result<Self, ProvenanceError> {
        let tag = match parent.and_then(|chain| chain.funding_chain_tag.as_ref()) {
            Some(tag) => tag.extend(segment)?,
            None => FundingChainTag::root(segment)?,
        };
        Ok(Self {
            funding_chain_tag: Some(tag),
            ultimate_source_entity_id: parent.and_then(|chain| chain.ultimate_source_entity_id.clone()),
            intermediary_entities: parent
                .map(|chain| chain.intermediary_entities.clone())
                .unwrap_or_default(),
            parent_exchange_id: Some(parent_exchange_id),
        })
    }

    /// True when any provenance is recorded.
    pub fn has_any(&self) -> bool {
        self.funding_chain_tag.is_some()
            || self.ultimate_source_entity_id.is_some()
            || !self.intermediary_entities.is_empty()
            || self.parent_exchange_id.is_some()
    }
}

impl Canonicalize for ProvenanceChain {
    fn canonical_record(&self) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record
            .insert_if_present(
                "fundingChainTag",
                self.funding_chain_tag.as_ref().map(ToString::to_string),
            )
            .insert_if_present(
                "ultimateSourceEntityId",
                self.ultimate_source_entity_id.as_ref().map(ToString::to_string),
            )
            .insert_if_present(
                "parentExchangeId",
                self.parent_exchange_id.as_ref().map(ToString::to_string),
            );
        if !self.intermediary_entities.is_empty() {
            record.insert(
                "intermediaryEntities",
                FieldValue::List(
                    self.intermediary_entities
                        .iter()
                        .map(|entity| FieldValue::Record(entity.canonical_record()))
                        .collect(),
                ),
            );
        }
        record
    }
}
