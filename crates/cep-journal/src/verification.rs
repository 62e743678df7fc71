//! Whole-journal verification.

use crate::errors::JournalError;
use crate::reader::{JournalReader, ReadMode};
use cep_core::{ChainIntegrityError, ChainVerification, Payload, RevisionChain, Verifier};
use std::path::Path;

/// Reads a journal and rebuilds its revision chain.
///
/// Every revision must belong to the same record and extend the one before
/// it; the first violation is returned.
pub fn verify_journal<P: Payload, Q: AsRef<Path>>(
    path: Q,
    mode: ReadMode,
) -> Result<RevisionChain<P>, JournalError> {
    let mut reader = JournalReader::open(path, mode)?;
    let revisions = reader.read_all::<P>()?;
    let first = revisions.first().ok_or(ChainIntegrityError::EmptyChain)?;
    if let Some(foreign) = revisions
        .iter()
        .find(|revision| revision.verifiable_id != first.verifiable_id)
    {
        return Err(JournalError::ForeignRecord {
            expected: first.verifiable_id.clone(),
            found: foreign.verifiable_id.clone(),
        });
    }
    let chain = RevisionChain::from_revisions(revisions)?;
    chain.verify_integrity()?;
    Ok(chain)
}

/// Rebuilds a journal's chain and checks every attestation and link.
pub fn verify_journal_attestations<P: Payload, Q: AsRef<Path>>(
    path: Q,
    mode: ReadMode,
    verifier: &Verifier,
) -> Result<ChainVerification, JournalError> {
    let chain = verify_journal::<P, Q>(path, mode)?;
    let report = verifier.verify_chain(chain.revisions());
    if !report.is_verified() {
        tracing::warn!(
            verifiable_id = %chain.verifiable_id(),
            revisions = chain.len(),
            "journal contains unverified revisions"
        );
    }
    Ok(report)
}
