//! Envelope filtering for selective iteration.

use crate::error::StoreError;
use crate::traits::StoreReader;
use cep_canonical::CanonicalTimestamp;
use cep_core::{RecordKind, StatusCode};
use cep_journal::EnvelopeJson;

/// Predicate over stored envelope JSON.
pub trait EnvelopeFilter {
    /// True when the envelope should be kept.
    fn matches(&self, envelope: &EnvelopeJson) -> bool;
}

fn timestamp(envelope: &EnvelopeJson, field: &str) -> Option<CanonicalTimestamp> {
    envelope
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|v| CanonicalTimestamp::parse(v).ok())
}

/// Keeps envelopes of one record kind.
#[derive(Debug, Clone, Copy)]
pub struct RecordKindFilter {
    /// Kind to keep.
    pub record_kind: RecordKind,
}

impl EnvelopeFilter for RecordKindFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        envelope.get("recordKind").and_then(|v| v.as_str()) == Some(self.record_kind.as_str())
    }
}

/// Keeps envelopes of one record.
#[derive(Debug, Clone)]
pub struct VerifiableIdFilter {
    /// Identifier string to match.
    pub verifiable_id: String,
}

impl EnvelopeFilter for VerifiableIdFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        envelope.get("verifiableId").and_then(|v| v.as_str()) == Some(self.verifiable_id.as_str())
    }
}

/// Keeps envelopes whose status code is one of `codes`.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    /// Accepted status codes.
    pub codes: Vec<StatusCode>,
}

impl EnvelopeFilter for StatusFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        let Some(code) = envelope
            .get("status")
            .and_then(|status| status.get("statusCode"))
            .and_then(|v| v.as_str())
        else {
            return false;
        };
        self.codes.iter().any(|accepted| accepted.as_str() == code)
    }
}

/// Keeps envelopes valid at an instant: `validFrom <= at < validTo`.
#[derive(Debug, Clone, Copy)]
pub struct ValidAtFilter {
    /// Instant to test.
    pub at: CanonicalTimestamp,
}

impl EnvelopeFilter for ValidAtFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        let Some(from) = timestamp(envelope, "validFrom") else {
            return false;
        };
        if self.at < from {
            return false;
        }
        match envelope.get("validTo") {
            None | Some(serde_json::Value::Null) => true,
            Some(_) => timestamp(envelope, "validTo").is_some_and(|to| self.at < to),
        }
    }
}

/// Keeps revisions whose `lastUpdatedAt` falls in a range (both ends inclusive).
#[derive(Debug, Clone, Copy)]
pub struct UpdatedRangeFilter {
    /// Lower bound.
    pub after: Option<CanonicalTimestamp>,
    /// Upper bound.
    pub before: Option<CanonicalTimestamp>,
}

impl EnvelopeFilter for UpdatedRangeFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        let Some(updated) = timestamp(envelope, "lastUpdatedAt") else {
            return false;
        };
        self.after.map_or(true, |after| updated >= after)
            && self.before.map_or(true, |before| updated <= before)
    }
}

/// All filters must match.
pub struct AndFilter {
    /// Combined filters.
    pub filters: Vec<Box<dyn EnvelopeFilter>>,
}

impl EnvelopeFilter for AndFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        self.filters.iter().all(|f| f.matches(envelope))
    }
}

/// Any filter must match.
pub struct OrFilter {
    /// Combined filters.
    pub filters: Vec<Box<dyn EnvelopeFilter>>,
}

impl EnvelopeFilter for OrFilter {
    fn matches(&self, envelope: &EnvelopeJson) -> bool {
        self.filters.iter().any(|f| f.matches(envelope))
    }
}

/// Reader that skips envelopes a filter rejects.
#[derive(Debug)]
pub struct FilteredReader<R: StoreReader, F: EnvelopeFilter> {
    reader: R,
    filter: F,
}

impl<R: StoreReader, F: EnvelopeFilter> FilteredReader<R, F> {
    /// Wraps `reader`.
    pub fn new(reader: R, filter: F) -> Self {
        Self { reader, filter }
    }
}

impl<R: StoreReader, F: EnvelopeFilter> StoreReader for FilteredReader<R, F> {
    fn read_next(&mut self) -> Result<Option<EnvelopeJson>, StoreError> {
        loop {
            match self.reader.read_next()? {
                None => return Ok(None),
                Some(envelope) if self.filter.matches(&envelope) => return Ok(Some(envelope)),
                Some(_) => continue,
            }
        }
    }
}
