//! Per-record revision arena.

use crate::error::StoreError;
use crate::traits::{HistoryBackend, MemoryBackend, StoreReader};
use cep_core::{
    assemble_envelope, check_link, Attestor, EnvelopeDraft, Payload, RecordEnvelope,
    RevisionChain, VerifiableId, Verifier,
};
use cep_journal::EnvelopeJson;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Store options.
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// When set, submitted envelopes must verify before they are accepted.
    pub verifier: Option<Verifier>,
}

type Slot<P> = Arc<Mutex<Option<RevisionChain<P>>>>;

/// Revision histories keyed by verifiable identifier.
///
/// Each history sits behind its own lock, taken for the whole
/// read-head/check/persist/publish sequence of an append. Appends to different
/// records never contend.
pub struct ChainStore<P: Payload, B: HistoryBackend<P> = MemoryBackend> {
    arena: DashMap<VerifiableId, Slot<P>>,
    backend: B,
    options: StoreOptions,
}

impl<P: Payload> ChainStore<P, MemoryBackend> {
    /// Empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            arena: DashMap::new(),
            backend: MemoryBackend,
            options: StoreOptions::default(),
        }
    }
}

impl<P: Payload, B: HistoryBackend<P>> ChainStore<P, B> {
    /// Opens a store over `backend`, replaying and re-validating every stored history.
    pub fn open(backend: B, options: StoreOptions) -> Result<Self, StoreError> {
        let arena = DashMap::new();
        let mut revisions = 0usize;
        for history in backend.load()? {
            let chain = RevisionChain::from_revisions(history)?;
            revisions += chain.len();
            if let Some(verifier) = &options.verifier {
                if let Some(failed) = chain
                    .revisions()
                    .iter()
                    .map(|revision| verifier.verify(revision))
                    .find(|result| !result.is_verified())
                {
                    return Err(StoreError::Unverified(Box::new(failed)));
                }
            }
            arena.insert(
                chain.verifiable_id().clone(),
                Arc::new(Mutex::new(Some(chain))),
            );
        }
        tracing::info!(records = arena.len(), revisions, "store opened");
        Ok(Self {
            arena,
            backend,
            options,
        })
    }

    fn slot(&self, verifiable_id: &VerifiableId) -> Slot<P> {
        if let Some(slot) = self.existing(verifiable_id) {
            return slot;
        }
        Arc::clone(self.arena.entry(verifiable_id.clone()).or_default().value())
    }

    fn existing(&self, verifiable_id: &VerifiableId) -> Option<Slot<P>> {
        self.arena
            .get(verifiable_id)
            .map(|slot| Arc::clone(slot.value()))
    }

    /// Assembles the next revision from a draft, persists it, and publishes it.
    ///
    /// A draft for an unknown identifier starts a new history at revision 1.
    pub fn append(
        &self,
        draft: EnvelopeDraft<P>,
        attestor: &dyn Attestor,
    ) -> Result<RecordEnvelope<P>, StoreError> {
        let verifiable_id = draft.verifiable_id.clone();
        self.with_slot(&verifiable_id, |chain| {
            let prior = chain.as_ref().map(|chain| chain.head());
            let next = assemble_envelope(draft, prior, attestor)?;
            self.publish(chain, next)
        })
    }

    /// Accepts an envelope assembled elsewhere.
    ///
    /// With a verifier configured the envelope must verify first.
    pub fn submit(&self, envelope: RecordEnvelope<P>) -> Result<RecordEnvelope<P>, StoreError> {
        if let Some(verifier) = &self.options.verifier {
            let result = verifier.verify(&envelope);
            if !result.is_verified() {
                return Err(StoreError::Unverified(Box::new(result)));
            }
        }
        let verifiable_id = envelope.verifiable_id.clone();
        self.with_slot(&verifiable_id, |chain| self.publish(chain, envelope))
    }

    /// Runs `write` under the record's lock. A history left empty by a failed
    /// write is dropped from the arena unless another writer holds its slot.
    fn with_slot<T>(
        &self,
        verifiable_id: &VerifiableId,
        write: impl FnOnce(&mut Option<RevisionChain<P>>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let slot = self.slot(verifiable_id);
        let mut guard = slot.lock();
        let result = write(&mut *guard);
        drop(guard);
        drop(slot);
        if result.is_err() {
            // Slots are only cloned under the shard lock, so a count of one is stable here.
            self.arena.remove_if(verifiable_id, |_, slot| {
                Arc::strong_count(slot) == 1 && slot.lock().is_none()
            });
        }
        result
    }

    fn publish(
        &self,
        chain: &mut Option<RevisionChain<P>>,
        next: RecordEnvelope<P>,
    ) -> Result<RecordEnvelope<P>, StoreError> {
        let checked = match chain.as_ref() {
            Some(chain) => chain.check_next(&next),
            None => check_link(None, &next),
        };
        if let Err(err) = checked {
            tracing::warn!(
                verifiable_id = %next.verifiable_id,
                revision = next.revision_number,
                error = %err,
                "revision rejected"
            );
            return Err(err.into());
        }
        self.backend.persist(&next)?;
        match chain {
            Some(chain) => {
                chain.accept(next.clone())?;
            }
            None => *chain = Some(RevisionChain::new(next.clone())?),
        }
        tracing::debug!(
            verifiable_id = %next.verifiable_id,
            revision = next.revision_number,
            "revision stored"
        );
        Ok(next)
    }

    /// Latest revision of a record.
    pub fn head(&self, verifiable_id: &VerifiableId) -> Option<RecordEnvelope<P>> {
        let slot = self.existing(verifiable_id)?;
        let guard = slot.lock();
        guard.as_ref().map(|chain| chain.head().clone())
    }

    /// A specific revision, addressed by `(verifiableId, revisionNumber)`.
    pub fn revision(
        &self,
        verifiable_id: &VerifiableId,
        revision_number: u64,
    ) -> Option<RecordEnvelope<P>> {
        let slot = self.existing(verifiable_id)?;
        let guard = slot.lock();
        guard.as_ref()?.get(revision_number).cloned()
    }

    /// Full history of a record.
    pub fn history(&self, verifiable_id: &VerifiableId) -> Option<RevisionChain<P>> {
        let slot = self.existing(verifiable_id)?;
        let guard = slot.lock();
        guard.clone()
    }

    /// Identifiers with at least one stored revision, sorted.
    pub fn verifiable_ids(&self) -> Vec<VerifiableId> {
        let slots: Vec<(VerifiableId, Slot<P>)> = self
            .arena
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let mut ids: Vec<VerifiableId> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of records with at least one revision.
    pub fn len(&self) -> usize {
        self.verifiable_ids().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend the store persists to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Point-in-time reader over every stored revision, record by record.
    pub fn snapshot(&self) -> Result<SnapshotReader, StoreError> {
        let mut revisions = VecDeque::new();
        for id in self.verifiable_ids() {
            if let Some(chain) = self.history(&id) {
                for revision in chain.revisions() {
                    revisions.push_back(serde_json::to_value(revision)?);
                }
            }
        }
        Ok(SnapshotReader { revisions })
    }
}

/// Reader over a snapshot taken by [`ChainStore::snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    revisions: VecDeque<EnvelopeJson>,
}

impl StoreReader for SnapshotReader {
    fn read_next(&mut self) -> Result<Option<EnvelopeJson>, StoreError> {
        Ok(self.revisions.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_canonical::{CanonicalTimestamp, Canonicalizer, UriRef};
    use cep_core::{Ed25519Attestor, EntityIdentity, EntityPayload};

    fn attestor() -> Ed25519Attestor {
        Ed25519Attestor::from_seed(
            "cep:attestor:clerk",
            UriRef::parse("https://keys.example.org/clerk#key-1").unwrap(),
            &[5u8; 32],
        )
    }

    fn draft(name: &str, hour: u32) -> EnvelopeDraft<EntityPayload> {
        let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
        let (id, payload) =
            EntityPayload::from_identity(&canonicalizer, &EntityIdentity::new(name, "US-NY"))
                .unwrap();
        let at = CanonicalTimestamp::parse(&format!("2025-06-01T{:02}:00:00Z", hour)).unwrap();
        EnvelopeDraft::new(id, payload, at)
    }

    #[test]
    fn rejected_first_revisions_leave_no_slot_behind() {
        let store = ChainStore::<EntityPayload>::in_memory();
        for (n, name) in ["Albany Port District", "Buffalo Sewer Authority"].iter().enumerate() {
            let mut envelope = assemble_envelope(draft(name, 1), None, &attestor()).unwrap();
            envelope.revision_number = 2 + n as u64;
            assert!(store.submit(envelope).is_err());
        }
        assert_eq!(store.arena.len(), 0);
        assert!(store.is_empty());

        let stored = store.append(draft("Albany Port District", 2), &attestor()).unwrap();
        assert_eq!(stored.revision_number, 1);
        assert_eq!(store.arena.len(), 1);
    }

    #[test]
    fn rejected_later_revision_keeps_the_history() {
        let store = ChainStore::<EntityPayload>::in_memory();
        let genesis = store.append(draft("Albany Port District", 1), &attestor()).unwrap();
        let mut repeat = draft("Albany Port District", 2);
        repeat.payload = genesis.payload.clone();
        assert!(store.append(repeat, &attestor()).is_err());
        assert_eq!(store.arena.len(), 1);
        assert_eq!(store.head(&genesis.verifiable_id), Some(genesis));
    }
}
