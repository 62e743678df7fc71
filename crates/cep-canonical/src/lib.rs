//! Canonical forms for civic entity records.
//!
//! Two layers live here. The field [`Canonicalizer`] turns raw, locale-specific
//! values (names, addresses, jurisdiction codes, dates) into one canonical
//! string each. The [`CanonicalSerializer`] turns structured records into one
//! deterministic byte string for hashing. Every value that participates in a
//! verifiable identifier or a record hash passes through this crate.
//!
#![deny(missing_docs)]

/// Fixed-scale decimals for amounts and shares.
pub mod amount;
/// Field canonicalization pipelines.
pub mod canonicalizer;
/// Hash primitives.
pub mod digest;
/// Hygiene report types emitted during serialization.
pub mod hygiene;
/// Validated string newtypes.
pub mod identifiers;
/// Localization rule tables.
pub mod rules;
/// Canonical record serialization.
pub mod serializer;
/// Canonical UTC timestamps.
pub mod timestamp;
/// Validation helpers used by canonical types.
pub mod validation;

pub use amount::{Amount, FixedDecimal, Rounding, Share};
pub use canonicalizer::{
    audit_collisions, CanonicalizationTrace, CanonicalizeError, Canonicalizer, CollisionGroup,
    CollisionReport, FieldKind,
};
pub use digest::{CanonicalHash, DigestAlg};
pub use hygiene::{HygieneReport, HygieneStatus, HygieneWarning};
pub use identifiers::{CountryCode, CurrencyCode, JurisdictionCode, ProfileId, SchemaVersion, UriRef};
pub use rules::{locale_key, LocalRule, ResolvedRules, RuleContext, RuleError, RuleRegistry, RuleTable};
pub use serializer::{
    serialize_canonical, CanonicalRecord, CanonicalSerializer, Canonicalize, FieldValue,
    SerializationProfile, SerializationResult, SerializeError,
};
pub use timestamp::CanonicalTimestamp;
pub use validation::ValidationError;
