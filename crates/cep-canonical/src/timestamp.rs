//! UTC timestamps rendered with exactly six fractional-second digits.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::ValidationError;

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A UTC instant at microsecond precision.
///
/// Parsing accepts RFC 3339 input with any offset and any number of
/// fractional digits, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC), or a
/// bare `YYYY-MM-DD` (midnight UTC). Sub-microsecond input is rounded half up
/// to the nearest microsecond; lower-precision input is zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalTimestamp(DateTime<Utc>);

impl CanonicalTimestamp {
    /// Parses and canonicalizes a timestamp string.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            dt.with_timezone(&Utc)
        } else if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            Utc.from_utc_datetime(&naive)
        } else if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            Utc.from_utc_datetime(&midnight)
        } else {
            return Err(ValidationError::PatternMismatch {
                field: "timestamp",
                value: value.to_string(),
            });
        };
        Ok(Self::from_datetime(parsed))
    }

    /// Wraps an existing instant, rounding to the nearest microsecond.
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        let sub_micro = i64::from(value.nanosecond() % 1_000);
        let truncated = value - Duration::nanoseconds(sub_micro);
        if sub_micro >= 500 {
            Self(truncated + Duration::microseconds(1))
        } else {
            Self(truncated)
        }
    }

    /// Underlying instant.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical string form, e.g. `2025-01-01T10:03:22.000000Z`.
    pub fn to_canonical_string(&self) -> String {
        self.0.format(CANONICAL_FORMAT).to_string()
    }
}

impl fmt::Display for CanonicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl From<DateTime<Utc>> for CanonicalTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_datetime(value)
    }
}

impl TryFrom<String> for CanonicalTimestamp {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanonicalTimestamp> for String {
    fn from(value: CanonicalTimestamp) -> Self {
        value.to_canonical_string()
    }
}
