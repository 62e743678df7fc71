//! Per-record revision store for civic record envelopes.
//!
//! This crate provides:
//! - `ChainStore`, an arena of revision histories keyed by verifiable identifier
//! - In-memory and journal-per-record backends
//! - Envelope filtering for selective iteration
//! - Typed envelope parsing and linkage views
//!
//! Core invariants:
//! - Appending to a record is single-writer: the head is read, checked and
//!   extended under that record's lock only
//! - A revision is persisted before it becomes visible, and never rewritten
//! - Reopening a journal-backed store re-validates every chain

#![deny(missing_docs)]

/// Error types for store operations.
pub mod error;
/// Envelope filtering API.
pub mod filter;
/// Journal-per-record backend.
pub mod journal;
/// The revision arena.
pub mod store;
/// Storage backend traits.
pub mod traits;
/// Typed envelope parsing.
pub mod typed;
/// Linkage views.
pub mod view;

pub use cep_journal::{EnvelopeJson, ReadMode, WriteOptions};
pub use error::StoreError;
pub use filter::{
    AndFilter, EnvelopeFilter, FilteredReader, OrFilter, RecordKindFilter, StatusFilter,
    UpdatedRangeFilter, ValidAtFilter, VerifiableIdFilter,
};
pub use journal::{journal_path, JournalBackend, JournalDirReader};
pub use store::{ChainStore, SnapshotReader, StoreOptions};
pub use traits::{HistoryBackend, MemoryBackend, StoreReader};
pub use typed::{parse_envelope, ParseError, TypedEnvelope};
pub use view::{
    derived_exchanges, exchanges_for_relationship, relationships_for_entity, resolve_revision,
};
