//! Error types for store operations.

use cep_core::{ChainIntegrityError, CoreError, VerifiableId, VerificationResult};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error outside the journal format itself.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Journal backend error.
    #[error("journal error: {0}")]
    Journal(#[from] cep_journal::JournalError),
    /// Envelope assembly failed.
    #[error(transparent)]
    Core(#[from] CoreError),
    /// A revision does not extend the stored head.
    #[error("chain integrity: {0}")]
    Chain(#[from] ChainIntegrityError),
    /// A submitted envelope failed verification.
    #[error("revision {} of {} is unverified", .0.revision_number, .0.verifiable_id)]
    Unverified(Box<VerificationResult>),
    /// A journal's file name does not match the record it holds.
    #[error("journal {path} holds {verifiable_id}")]
    MisplacedJournal {
        /// Journal path.
        path: PathBuf,
        /// Record found inside.
        verifiable_id: VerifiableId,
    },
    /// Envelope could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Envelope JSON could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] crate::typed::ParseError),
}
