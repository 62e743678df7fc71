use cep_core::{ChainIntegrityError, RecordKind, VerifiableId};
use thiserror::Error;

/// Errors raised while reading or writing a revision journal.
#[derive(Error, Debug)]
pub enum JournalError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Header magic, version, flags or reserved bytes are wrong.
    #[error("invalid journal header: {0}")]
    InvalidHeader(String),
    /// Frame header is malformed.
    #[error("invalid frame at offset {offset}: {reason}")]
    InvalidFrame {
        /// Byte offset where the frame starts.
        offset: u64,
        /// What is wrong with it.
        reason: String,
    },
    /// Payload exceeds the frame size limit.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size.
        size: u64,
        /// Maximum allowed size.
        max: u32,
    },
    /// Envelope frame is not UTF-8.
    #[error("invalid UTF-8 in envelope frame: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    /// Envelope frame is not JSON, or not an envelope of the expected payload type.
    #[error("envelope JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),
    /// Envelope frame lacks the envelope fields.
    #[error("not a record envelope at offset {offset}: {reason}")]
    NotAnEnvelope {
        /// Byte offset of the frame.
        offset: u64,
        /// Missing or malformed field.
        reason: String,
    },
    /// A short existing file cannot be initialized with a header.
    #[error("file is not empty; cannot initialize header")]
    FileNotEmpty,
    /// A frame is cut short (strict mode only).
    #[error("truncated frame at offset {offset}")]
    TruncatedFrame {
        /// Byte offset where truncation occurred.
        offset: u64,
    },
    /// An envelope of another record kind was found.
    #[error("expected {expected} envelope, found {found} at offset {offset}")]
    KindMismatch {
        /// Byte offset of the frame.
        offset: u64,
        /// Kind the reader was asked for.
        expected: RecordKind,
        /// Kind in the frame.
        found: RecordKind,
    },
    /// A journal holds revisions of exactly one record.
    #[error("journal for {expected} contains a revision of {found}")]
    ForeignRecord {
        /// Identifier of the journal's record.
        expected: VerifiableId,
        /// Identifier found in a later frame.
        found: VerifiableId,
    },
    /// Stored revisions do not form a valid chain.
    #[error("chain integrity: {0}")]
    Chain(#[from] ChainIntegrityError),
}
