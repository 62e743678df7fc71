use crate::identifiers::ProfileId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hygiene status for a serialization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HygieneStatus {
    /// The input serialized without adjustments.
    Ok,
    /// The input was accepted but a value was rounded or a null dropped.
    Lossy,
    /// The input was rejected.
    Invalid,
}

/// Stable warning code emitted during serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HygieneWarning(String);

impl HygieneWarning {
    /// Creates a warning from a literal code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Warning code.
    pub fn code(&self) -> &str {
        &self.0
    }
}

/// Report produced alongside canonical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HygieneReport {
    /// Overall hygiene status.
    pub status: HygieneStatus,
    /// Stable warning codes, in traversal order.
    pub warnings: Vec<HygieneWarning>,
    /// Counters such as `rounded_amounts` or `omitted_nulls`.
    pub metrics: BTreeMap<String, u64>,
    /// Identifier of the canonicalization profile that produced the bytes.
    pub profile_id: ProfileId,
}

impl HygieneReport {
    /// Empty report for `profile_id`.
    pub fn new(profile_id: ProfileId) -> Self {
        Self {
            status: HygieneStatus::Ok,
            warnings: Vec::new(),
            metrics: BTreeMap::new(),
            profile_id,
        }
    }

    /// Records a lossy adjustment under `metric`, with a warning naming where it happened.
    pub(crate) fn record_lossy(&mut self, metric: &str, warning: String) {
        if self.status == HygieneStatus::Ok {
            self.status = HygieneStatus::Lossy;
        }
        self.warnings.push(HygieneWarning::new(warning));
        self.bump(metric);
    }

    pub(crate) fn bump(&mut self, metric: &str) {
        *self.metrics.entry(metric.to_string()).or_insert(0) += 1;
    }
}
