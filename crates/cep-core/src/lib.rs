//! Verifiable identifiers, record envelopes, and revision chains for civic records.
//!
//! This crate provides:
//! - Verifiable identifier derivation (`{recordKind}:{scheme}:{hash}`) from canonical input
//! - Identifier resolution with confidence-scored claims and conflict detection
//! - Entity, relationship, and exchange payloads wrapped in a shared record envelope
//! - Append-only revision chains linked by previous-record hashes
//! - Attestation and offline verification, per envelope and per link
//!
//! Core invariants:
//! - Identifiers are content-derived and never recomputed from amended data
//! - A revision is accepted only if it extends the current head exactly
//! - Verification is deterministic, offline, and mutates nothing
//!
#![deny(missing_docs)]

/// Attestation blocks and attestors.
pub mod attestation;
/// Revision chains and chain integrity checks.
pub mod chain;
/// Entity payloads.
pub mod entity;
/// Record envelopes and envelope assembly.
pub mod envelope;
/// Error types for core operations.
pub mod errors;
/// Exchange payloads.
pub mod exchange;
/// Canonical input and verifiable identifiers.
pub mod identity;
/// Funding provenance tags and links.
pub mod provenance;
/// Relationship payloads.
pub mod relationship;
/// Identifier claims, merging, and the cross-submission index.
pub mod resolver;
/// External identifier schemes.
pub mod schemes;
/// Shared types used across payloads.
pub mod shared;
/// Attestation verification and link verdicts.
pub mod verification;

pub use attestation::{
    signing_input, Attestation, Attestor, Ed25519Attestor, ManualAttestor, ProofType,
    ATTESTATION_DOMAIN_SEPARATOR,
};
pub use chain::{check_link, reconstruct_history, verify_links, ChainIntegrityError, RevisionChain};
pub use entity::EntityPayload;
pub use envelope::{
    assemble_envelope, EnvelopeDraft, Payload, RecordEnvelope, RecordStatus, StatusCode,
};
pub use errors::CoreError;
pub use exchange::{Categorization, ExchangeParty, ExchangePayload, ExchangeValue};
pub use identity::{
    compute_verifiable_id, CanonicalInput, EntityIdentity, RecordKind, VerifiableId,
};
pub use provenance::{
    FundingChainTag, IntermediaryEntity, ProvenanceChain, ProvenanceError, ProvenanceLink,
};
pub use relationship::{FinancialTerms, Member, Parties, Party, RelationshipPayload};
pub use resolver::{
    resolve_identifiers, ConflictKind, IdentifierClaim, IdentifierSet, IdentityIndex,
    ResolutionConfidence, ResolveError,
};
pub use schemes::IdentifierScheme;
pub use shared::SourceReference;
pub use verification::{
    AnchorOutcome, AnchorResolver, AttributedFailure, ChainVerification, KeyResolver, LinkEnd,
    LinkVerdict, StaticAnchorResolver, StaticKeyResolver, VerificationFailure, VerificationResult,
    VerificationStatus, Verifier, VerifierOptions,
};
