use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;

use crate::validation::ValidationError;

static HEX_256: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("invalid regex"));

/// Supported digest algorithms for canonical hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlg {
    /// SHA-256, the only algorithm of hash version 1.
    #[serde(rename = "sha-256")]
    Sha256,
}

impl DigestAlg {
    /// Stable name used in identifiers and provenance records.
    pub fn as_str(self) -> &'static str {
        match self {
            DigestAlg::Sha256 => "sha-256",
        }
    }
}

/// SHA-256 digest of canonical bytes, encoded as 64 lowercase hex characters.
///
/// Every hash in a record envelope (verifiable identifiers, `previousRecordHash`,
/// rule-table config hashes) uses this encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalHash(String);

impl CanonicalHash {
    /// Hashes raw bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Hashes `domain_separator || bytes`.
    pub fn with_domain(domain_separator: &[u8], bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain_separator);
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parses a previously computed hash.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if !HEX_256.is_match(&value) {
            return Err(ValidationError::PatternMismatch {
                field: "canonical_hash",
                value,
            });
        }
        Ok(Self(value))
    }

    /// Algorithm that produced this hash.
    pub fn alg(&self) -> DigestAlg {
        DigestAlg::Sha256
    }

    /// Lowercase hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CanonicalHash {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CanonicalHash> for String {
    fn from(value: CanonicalHash) -> Self {
        value.0
    }
}
