//! Append-only journal format for civic record envelope revisions.
//!
//! This crate provides:
//! - Framed, append-only storage of envelope revisions as JSON
//! - Reader/writer APIs with strict and permissive truncation handling
//! - Whole-journal verification that rebuilds and checks the revision chain
//!
//! A journal holds the history of exactly one record, so a revision is
//! addressed by `(verifiableId, revisionNumber)` through the file it lives in
//! and its position in that file.
//!
//! ## Format
//!
//! ```text
//! header  := "CEPJ" version:u16le flags:u16le reserved:[u8; 8]
//! frame   := kind:u8 reserved:[u8; 3] len:u32le payload:[u8; len]
//! journal := header frame*
//! ```
//!
//! Frame kind `0x01` carries the UTF-8 JSON of one envelope revision. Unknown
//! kinds are skipped by readers.

#![deny(missing_docs)]

/// Untyped envelope JSON helpers.
pub mod envelope;
/// Error types for journal operations.
pub mod errors;
/// File and frame headers.
pub mod frame;
/// Journal reader.
pub mod reader;
/// Whole-journal verification.
pub mod verification;
/// Journal writer.
pub mod writer;

pub use envelope::EnvelopeJson;
pub use errors::JournalError;
pub use frame::{FrameHeader, FrameKind, JournalHeader};
pub use reader::{JournalReader, ReadMode};
pub use verification::{verify_journal, verify_journal_attestations};
pub use writer::{JournalWriter, WriteOptions};
