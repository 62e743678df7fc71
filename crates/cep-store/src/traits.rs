//! Storage backend traits.

use crate::error::StoreError;
use cep_core::{Payload, RecordEnvelope};
use cep_journal::EnvelopeJson;

/// Sequential reader over stored envelope revisions.
pub trait StoreReader {
    /// Next revision as JSON, or `None` when exhausted.
    fn read_next(&mut self) -> Result<Option<EnvelopeJson>, StoreError>;
}

/// Durable home for revision histories.
///
/// `persist` is called with the owning record's lock held, after the revision
/// has been checked against the head and before it becomes visible. Calls for
/// different records may run concurrently.
pub trait HistoryBackend<P: Payload>: Send + Sync {
    /// Persists one accepted revision.
    fn persist(&self, revision: &RecordEnvelope<P>) -> Result<(), StoreError>;

    /// Every stored history, each in revision order.
    fn load(&self) -> Result<Vec<Vec<RecordEnvelope<P>>>, StoreError>;
}

/// Backend that keeps nothing beyond the store's own memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

impl<P: Payload> HistoryBackend<P> for MemoryBackend {
    fn persist(&self, _revision: &RecordEnvelope<P>) -> Result<(), StoreError> {
        Ok(())
    }

    fn load(&self) -> Result<Vec<Vec<RecordEnvelope<P>>>, StoreError> {
        Ok(Vec::new())
    }
}
