use cep_canonical::{CanonicalHash, Canonicalize};
use std::collections::HashMap;
use thiserror::Error;

use crate::attestation::Attestor;
use crate::envelope::{assemble_envelope, EnvelopeDraft, Payload, RecordEnvelope};
use crate::errors::CoreError;
use crate::identity::VerifiableId;

/// A revision does not extend its chain. Fatal to accepting that revision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainIntegrityError {
    /// Revision number is not one greater than the head's.
    #[error("{verifiable_id}: expected revision {expected}, found {found}")]
    RevisionGap {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Revision the chain requires next.
        expected: u64,
        /// Revision offered.
        found: u64,
    },
    /// The head is at the largest representable revision number.
    #[error("{verifiable_id}: revision {revision} cannot be extended")]
    RevisionOverflow {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Revision of the head.
        revision: u64,
    },
    /// `previousRecordHash` does not match the prior revision's record hash.
    #[error("{verifiable_id} revision {revision}: previous hash {found} does not match {expected}")]
    PreviousHashMismatch {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Offending revision.
        revision: u64,
        /// Hash of the prior revision.
        expected: CanonicalHash,
        /// Hash carried by the revision.
        found: CanonicalHash,
    },
    /// Revision 1 carries a previous hash.
    #[error("{verifiable_id}: revision 1 must not carry a previous hash")]
    UnexpectedPreviousHash {
        /// Record identifier.
        verifiable_id: VerifiableId,
    },
    /// A revision after the first has no previous hash.
    #[error("{verifiable_id} revision {revision}: missing previous hash")]
    MissingPreviousHash {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Offending revision.
        revision: u64,
    },
    /// Revision changes no substantive field.
    #[error("{verifiable_id} revision {revision}: no substantive change")]
    NoSubstantiveChange {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Offending revision.
        revision: u64,
    },
    /// Revision belongs to a different record.
    #[error("revision for {found} offered to chain of {expected}")]
    IdentifierChanged {
        /// Chain identifier.
        expected: VerifiableId,
        /// Identifier on the revision.
        found: VerifiableId,
    },
    /// A stored revision no longer hashes to its successor's pointer.
    #[error("{verifiable_id} revision {revision}: content no longer matches successor's previous hash")]
    BrokenLink {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Revision whose content changed.
        revision: u64,
    },
    /// A pointed-to predecessor is not available.
    #[error("{verifiable_id} revision {revision}: predecessor {previous} not found")]
    MissingPredecessor {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Revision whose predecessor is missing.
        revision: u64,
        /// Hash it points at.
        previous: CanonicalHash,
    },
    /// No revisions were supplied.
    #[error("chain has no revisions")]
    EmptyChain,
    /// A revision could not be serialized for hashing.
    #[error("{verifiable_id} revision {revision}: {reason}")]
    Serialization {
        /// Record identifier.
        verifiable_id: VerifiableId,
        /// Offending revision.
        revision: u64,
        /// Serializer message.
        reason: String,
    },
}

fn hash_of<P: Payload>(envelope: &RecordEnvelope<P>) -> Result<CanonicalHash, ChainIntegrityError> {
    envelope
        .record_hash()
        .map_err(|err| ChainIntegrityError::Serialization {
            verifiable_id: envelope.verifiable_id.clone(),
            revision: envelope.revision_number,
            reason: err.to_string(),
        })
}

/// Revision number that follows `prior`.
pub(crate) fn next_revision_number<P: Payload>(
    prior: &RecordEnvelope<P>,
) -> Result<u64, ChainIntegrityError> {
    prior
        .revision_number
        .checked_add(1)
        .ok_or_else(|| ChainIntegrityError::RevisionOverflow {
            verifiable_id: prior.verifiable_id.clone(),
            revision: prior.revision_number,
        })
}

/// Checks that `next` validly extends `prior` (or starts a chain when `prior` is `None`).
pub fn check_link<P: Payload>(
    prior: Option<&RecordEnvelope<P>>,
    next: &RecordEnvelope<P>,
) -> Result<(), ChainIntegrityError> {
    let Some(prior) = prior else {
        if next.revision_number != 1 {
            return Err(ChainIntegrityError::RevisionGap {
                verifiable_id: next.verifiable_id.clone(),
                expected: 1,
                found: next.revision_number,
            });
        }
        if next.previous_record_hash.is_some() {
            return Err(ChainIntegrityError::UnexpectedPreviousHash {
                verifiable_id: next.verifiable_id.clone(),
            });
        }
        return Ok(());
    };

    if next.verifiable_id != prior.verifiable_id {
        return Err(ChainIntegrityError::IdentifierChanged {
            expected: prior.verifiable_id.clone(),
            found: next.verifiable_id.clone(),
        });
    }
    let expected = next_revision_number(prior)?;
    if next.revision_number != expected {
        return Err(ChainIntegrityError::RevisionGap {
            verifiable_id: next.verifiable_id.clone(),
            expected,
            found: next.revision_number,
        });
    }
    let found = next
        .previous_record_hash
        .clone()
        .ok_or_else(|| ChainIntegrityError::MissingPreviousHash {
            verifiable_id: next.verifiable_id.clone(),
            revision: next.revision_number,
        })?;
    let expected = hash_of(prior)?;
    if found != expected {
        return Err(ChainIntegrityError::PreviousHashMismatch {
            verifiable_id: next.verifiable_id.clone(),
            revision: next.revision_number,
            expected,
            found,
        });
    }
    let changed = next
        .differs_substantively(prior)
        .map_err(|err| ChainIntegrityError::Serialization {
            verifiable_id: next.verifiable_id.clone(),
            revision: next.revision_number,
            reason: err.to_string(),
        })?;
    if !changed {
        return Err(ChainIntegrityError::NoSubstantiveChange {
            verifiable_id: next.verifiable_id.clone(),
            revision: next.revision_number,
        });
    }
    Ok(())
}

/// Walks `previousRecordHash` pointers backward from the last revision to the first.
///
/// Returns the canonical serializations in revision order. A revision whose
/// content was altered after its successor was written is reported as
/// [`ChainIntegrityError::BrokenLink`] at that revision.
pub fn verify_links<P: Payload>(
    revisions: &[RecordEnvelope<P>],
) -> Result<Vec<String>, ChainIntegrityError> {
    let mut serializations = Vec::with_capacity(revisions.len());
    for (index, revision) in revisions.iter().enumerate().rev() {
        let canonical = revision
            .to_canonical_string()
            .map_err(|err| ChainIntegrityError::Serialization {
                verifiable_id: revision.verifiable_id.clone(),
                revision: revision.revision_number,
                reason: err.to_string(),
            })?;
        if let Some(successor) = revisions.get(index + 1) {
            if successor.previous_record_hash.as_ref()
                != Some(&CanonicalHash::of(canonical.as_bytes()))
            {
                return Err(ChainIntegrityError::BrokenLink {
                    verifiable_id: revision.verifiable_id.clone(),
                    revision: revision.revision_number,
                });
            }
        }
        let prior = index.checked_sub(1).and_then(|i| revisions.get(i));
        match prior {
            Some(prior) => {
                if revision.verifiable_id != prior.verifiable_id {
                    return Err(ChainIntegrityError::IdentifierChanged {
                        expected: prior.verifiable_id.clone(),
                        found: revision.verifiable_id.clone(),
                    });
                }
                let expected = next_revision_number(prior)?;
                if revision.revision_number != expected {
                    return Err(ChainIntegrityError::RevisionGap {
                        verifiable_id: revision.verifiable_id.clone(),
                        expected,
                        found: revision.revision_number,
                    });
                }
                if revision.previous_record_hash.is_none() {
                    return Err(ChainIntegrityError::MissingPreviousHash {
                        verifiable_id: revision.verifiable_id.clone(),
                        revision: revision.revision_number,
                    });
                }
            }
            None => check_link(None, revision)?,
        }
        serializations.push(canonical);
    }
    serializations.reverse();
    Ok(serializations)
}

/// Append-only history of one logical record.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionChain<P> {
    revisions: Vec<RecordEnvelope<P>>,
}

impl<P: Payload> RevisionChain<P> {
    /// Starts a chain from revision 1.
    pub fn new(genesis: RecordEnvelope<P>) -> Result<Self, ChainIntegrityError> {
        check_link(None, &genesis)?;
        Ok(Self {
            revisions: vec![genesis],
        })
    }

    /// Builds a chain from revisions in order, checking every link.
    pub fn from_revisions(
        revisions: impl IntoIterator<Item = RecordEnvelope<P>>,
    ) -> Result<Self, ChainIntegrityError> {
        let mut iter = revisions.into_iter();
        let genesis = iter.next().ok_or(ChainIntegrityError::EmptyChain)?;
        let mut chain = Self::new(genesis)?;
        for revision in iter {
            chain.accept(revision)?;
        }
        Ok(chain)
    }

    /// Identifier of the record.
    pub fn verifiable_id(&self) -> &VerifiableId {
        &self.head().verifiable_id
    }

    /// Latest revision.
    pub fn head(&self) -> &RecordEnvelope<P> {
        &self.revisions[self.revisions.len() - 1]
    }

    /// Record hash of the latest revision.
    pub fn head_hash(&self) -> Result<CanonicalHash, ChainIntegrityError> {
        hash_of(self.head())
    }

    /// Number of revisions.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Always false; a chain holds at least revision 1.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Revision by number.
    pub fn get(&self, revision_number: u64) -> Option<&RecordEnvelope<P>> {
        let index = usize::try_from(revision_number.checked_sub(1)?).ok()?;
        self.revisions.get(index)
    }

    /// Revisions in order.
    pub fn revisions(&self) -> &[RecordEnvelope<P>] {
        &self.revisions
    }

    /// Consumes the chain, returning its revisions.
    pub fn into_revisions(self) -> Vec<RecordEnvelope<P>> {
        self.revisions
    }

    /// Checks a candidate revision against the head without accepting it.
    pub fn check_next(&self, candidate: &RecordEnvelope<P>) -> Result<(), ChainIntegrityError> {
        check_link(Some(self.head()), candidate)
    }

    /// Accepts an already-assembled revision.
    pub fn accept(
        &mut self,
        candidate: RecordEnvelope<P>,
    ) -> Result<&RecordEnvelope<P>, ChainIntegrityError> {
        if let Err(err) = self.check_next(&candidate) {
            tracing::warn!(
                verifiable_id = %candidate.verifiable_id,
                revision = candidate.revision_number,
                error = %err,
                "revision rejected"
            );
            return Err(err);
        }
        self.revisions.push(candidate);
        Ok(self.head())
    }

    /// Assembles the next revision from a draft and appends it.
    pub fn append(
        &mut self,
        draft: EnvelopeDraft<P>,
        attestor: &dyn Attestor,
    ) -> Result<&RecordEnvelope<P>, CoreError> {
        let next = assemble_envelope(draft, Some(self.head()), attestor)?;
        Ok(self.accept(next)?)
    }

    /// Re-verifies the whole chain by walking backward from the head.
    pub fn verify_integrity(&self) -> Result<Vec<String>, ChainIntegrityError> {
        verify_links(&self.revisions)
    }

    /// Canonical serializations of every revision, in order.
    pub fn canonical_serializations(&self) -> Result<Vec<String>, ChainIntegrityError> {
        self.revisions
            .iter()
            .map(|revision| {
                revision
                    .to_canonical_string()
                    .map_err(|err| ChainIntegrityError::Serialization {
                        verifiable_id: revision.verifiable_id.clone(),
                        revision: revision.revision_number,
                        reason: err.to_string(),
                    })
            })
            .collect()
    }
}

/// Rebuilds a chain from its head and an unordered pool of revisions.
///
/// Only `previousRecordHash` pointers are followed; no index of revision
/// numbers is consulted.
pub fn reconstruct_history<P: Payload>(
    head: &RecordEnvelope<P>,
    pool: &[RecordEnvelope<P>],
) -> Result<RevisionChain<P>, ChainIntegrityError> {
    let mut by_hash: HashMap<CanonicalHash, &RecordEnvelope<P>> = HashMap::with_capacity(pool.len());
    for revision in pool {
        by_hash.insert(hash_of(revision)?, revision);
    }

    let mut backward = vec![head.clone()];
    let mut current = head;
    while let Some(previous) = &current.previous_record_hash {
        if backward.len() > pool.len() {
            break;
        }
        let predecessor =
            by_hash
                .get(previous)
                .ok_or_else(|| ChainIntegrityError::MissingPredecessor {
                    verifiable_id: current.verifiable_id.clone(),
                    revision: current.revision_number,
                    previous: previous.clone(),
                })?;
        backward.push((*predecessor).clone());
        current = *predecessor;
    }
    backward.reverse();
    RevisionChain::from_revisions(backward)
}
