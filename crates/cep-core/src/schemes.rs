use cep_canonical::{UriRef, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static LEI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{18}[0-9]{2}$").expect("invalid regex"));
static SAM_UEI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{12}$").expect("invalid regex"));
static CANADIAN_BN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{9}([A-Z]{2}[0-9]{4})?$").expect("invalid regex"));
static SNFEI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("invalid regex"));

/// External identifier scheme.
///
/// Ordering follows [`priority`](Self::priority), so sets keyed by scheme
/// list the preferred identifier first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdentifierScheme {
    /// ISO 17442 Legal Entity Identifier.
    Lei,
    /// US System for Award Management Unique Entity ID.
    SamUei,
    /// Structured non-fungible entity identifier derived by this protocol.
    Snfei,
    /// Canada Revenue Agency business number.
    CanadianBn,
    /// Any other registry, named by URI.
    Other(UriRef),
}

impl IdentifierScheme {
    /// Wire name (`lei`, `sam-uei`, `snfei`, `canadian-bn`, `other:<uri>`).
    pub fn name(&self) -> String {
        match self {
            IdentifierScheme::Lei => "lei".to_string(),
            IdentifierScheme::SamUei => "sam-uei".to_string(),
            IdentifierScheme::Snfei => "snfei".to_string(),
            IdentifierScheme::CanadianBn => "canadian-bn".to_string(),
            IdentifierScheme::Other(uri) => format!("other:{}", uri),
        }
    }

    /// Parses a wire name.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "lei" => Ok(IdentifierScheme::Lei),
            "sam-uei" => Ok(IdentifierScheme::SamUei),
            "snfei" => Ok(IdentifierScheme::Snfei),
            "canadian-bn" => Ok(IdentifierScheme::CanadianBn),
            other => match other.strip_prefix("other:") {
                Some(uri) => Ok(IdentifierScheme::Other(UriRef::parse(uri)?)),
                None => Err(ValidationError::PatternMismatch {
                    field: "identifierScheme",
                    value: other.to_string(),
                }),
            },
        }
    }

    /// Preference rank when choosing a primary identifier; lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            IdentifierScheme::Lei => 0,
            IdentifierScheme::SamUei => 1,
            IdentifierScheme::Snfei => 2,
            IdentifierScheme::CanadianBn => 3,
            IdentifierScheme::Other(_) => 4,
        }
    }

    /// Validates a claimed value and returns its normalized form.
    ///
    /// LEI, SAM UEI and BN values are upper-cased with spaces removed; SNFEI
    /// values are lower-cased hex. Values of other schemes are trimmed only.
    pub fn normalize_value(&self, value: &str) -> Result<String, ValidationError> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let (normalized, pattern, field) = match self {
            IdentifierScheme::Lei => (compact.to_uppercase(), &*LEI, "lei"),
            IdentifierScheme::SamUei => (compact.to_uppercase(), &*SAM_UEI, "samUei"),
            IdentifierScheme::CanadianBn => (compact.to_uppercase(), &*CANADIAN_BN, "canadianBn"),
            IdentifierScheme::Snfei => (compact.to_lowercase(), &*SNFEI, "snfei"),
            IdentifierScheme::Other(_) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::PatternMismatch {
                        field: "identifier",
                        value: value.to_string(),
                    });
                }
                return Ok(trimmed.to_string());
            }
        };
        if !pattern.is_match(&normalized) {
            return Err(ValidationError::PatternMismatch {
                field,
                value: value.to_string(),
            });
        }
        Ok(normalized)
    }
}

impl fmt::Display for IdentifierScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for IdentifierScheme {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdentifierScheme> for String {
    fn from(value: IdentifierScheme) -> Self {
        value.name()
    }
}
