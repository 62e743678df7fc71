use crate::validation::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype {
    ($name:ident, $doc:expr, $pattern:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses a validated value from a string.
            pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
                static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new($pattern).expect("invalid regex"));
                let s = value.into();
                if !PATTERN.is_match(&s) {
                    return Err(ValidationError::PatternMismatch {
                        field: stringify!($name),
                        value: s,
                    });
                }
                Ok(Self(s))
            }

            /// Borrowed string form.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

newtype!(
    ProfileId,
    "Identifier for canonicalization profiles (pattern: `[a-z0-9][a-z0-9_-]{2,127}`).",
    r"^[a-z0-9][a-z0-9_-]{2,127}$"
);
newtype!(
    JurisdictionCode,
    "ISO 3166 country or subdivision code such as `US` or `US-CA`.",
    r"^[A-Z]{2}(-[A-Z0-9]{1,3})?$"
);
newtype!(
    CountryCode,
    "ISO 3166-1 alpha-2 country code.",
    r"^[A-Z]{2}$"
);
newtype!(
    CurrencyCode,
    "ISO 4217 currency code.",
    r"^[A-Z]{3}$"
);
newtype!(
    SchemaVersion,
    "Dotted numeric schema version (`1.0` or `1.0.0`).",
    r"^[0-9]+\.[0-9]+(\.[0-9]+)?$"
);
newtype!(
    UriRef,
    "Absolute URI reference (scheme followed by a non-empty body without whitespace).",
    r"^[A-Za-z][A-Za-z0-9+.-]*:\S+$"
);

impl ProfileId {
    /// Profile used when callers do not name one.
    pub fn default_profile() -> Self {
        Self("cep-canonical-v1".to_string())
    }
}

impl SchemaVersion {
    /// Schema version stamped on newly assembled records.
    pub fn current() -> Self {
        Self("1.0.0".to_string())
    }
}

impl JurisdictionCode {
    /// Country part of the code (`US` for `US-CA`).
    pub fn country(&self) -> CountryCode {
        CountryCode(self.0[..2].to_string())
    }

    /// Rule-table key for this jurisdiction (`us/ca` for `US-CA`).
    pub fn locale_key(&self) -> String {
        self.0.to_lowercase().replace('-', "/")
    }
}
