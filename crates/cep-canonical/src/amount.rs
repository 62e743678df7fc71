//! Fixed-scale decimals for monetary amounts and participation shares.
//!
//! Values are held as an integer count of `10^-SCALE` units so that rendering
//! never goes through floating-point formatting. Rounding is half away from
//! zero on the first dropped digit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::ValidationError;

static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-])?([0-9]+)(?:\.([0-9]+))?$").expect("invalid regex"));

const MAX_INTEGER_DIGITS: usize = 30;

/// Whether parsing had to drop non-zero digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// The input was representable at this scale.
    Exact,
    /// Digits beyond the scale were rounded away.
    Rounded,
}

/// Decimal with exactly `SCALE` fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixedDecimal<const SCALE: u32>(i128);

/// Monetary amount, always rendered with two decimal places.
pub type Amount = FixedDecimal<2>;

/// Fractional share (participation ratios), rendered with four decimal places.
pub type Share = FixedDecimal<4>;

impl<const SCALE: u32> FixedDecimal<SCALE> {
    /// Zero at this scale.
    pub const ZERO: Self = Self(0);

    /// One whole unit at this scale.
    pub fn one() -> Self {
        Self(10i128.pow(SCALE))
    }

    /// Builds a value directly from its unit count (`units * 10^-SCALE`).
    pub fn from_units(units: i128) -> Self {
        Self(units)
    }

    /// Unit count (`self * 10^SCALE`).
    pub fn units(&self) -> i128 {
        self.0
    }

    /// Parses a plain decimal string such as `"100"`, `"-3.5"` or `"50000.756"`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        Self::parse_reporting(value).map(|(decimal, _)| decimal)
    }

    /// Parses and reports whether rounding occurred.
    pub fn parse_reporting(value: &str) -> Result<(Self, Rounding), ValidationError> {
        let trimmed = value.trim();
        let caps = DECIMAL
            .captures(trimmed)
            .ok_or_else(|| ValidationError::PatternMismatch {
                field: "decimal",
                value: value.to_string(),
            })?;
        let negative = caps.get(1).map(|m| m.as_str() == "-").unwrap_or(false);
        let integer = caps.get(2).map(|m| m.as_str()).unwrap_or("0");
        let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        let integer = integer.trim_start_matches('0');
        if integer.len() > MAX_INTEGER_DIGITS {
            return Err(ValidationError::OutOfBounds {
                field: "decimal",
                value: value.to_string(),
            });
        }

        let scale = SCALE as usize;
        let mut digits = String::with_capacity(integer.len() + scale);
        digits.push_str(integer);
        let kept: String = fraction.chars().take(scale).collect();
        digits.push_str(&kept);
        for _ in kept.len()..scale {
            digits.push('0');
        }

        let mut magnitude: i128 = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| ValidationError::OutOfBounds {
                field: "decimal",
                value: value.to_string(),
            })?
        };

        let dropped = fraction.get(scale..).unwrap_or("");
        let rounding = if dropped.bytes().any(|b| b != b'0') {
            Rounding::Rounded
        } else {
            Rounding::Exact
        };
        if dropped.as_bytes().first().map(|b| *b >= b'5').unwrap_or(false) {
            magnitude += 1;
        }

        let units = if negative { -magnitude } else { magnitude };
        Ok((Self(units), rounding))
    }

    /// Converts a float through its shortest round-trip decimal representation.
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        Self::from_f64_reporting(value).map(|(decimal, _)| decimal)
    }

    /// Float conversion that reports whether rounding occurred.
    pub fn from_f64_reporting(value: f64) -> Result<(Self, Rounding), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field: "decimal" });
        }
        // f64 Display never uses exponent notation.
        Self::parse_reporting(&format!("{}", value))
    }

    /// Exact conversion from an integer.
    pub fn from_i64(value: i64) -> Self {
        Self(i128::from(value) * 10i128.pow(SCALE))
    }

    /// Sum, or `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// True when the value is below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl<const SCALE: u32> fmt::Display for FixedDecimal<SCALE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let divisor = 10u128.pow(SCALE);
        if SCALE == 0 {
            return write!(f, "{}{}", sign, magnitude);
        }
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            magnitude / divisor,
            magnitude % divisor,
            width = SCALE as usize
        )
    }
}

impl<const SCALE: u32> TryFrom<String> for FixedDecimal<SCALE> {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl<const SCALE: u32> From<FixedDecimal<SCALE>> for String {
    fn from(value: FixedDecimal<SCALE>) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_forms_agree() {
        assert_eq!(Amount::from_i64(100).to_string(), "100.00");
        assert_eq!(Amount::from_f64(100.0).unwrap().to_string(), "100.00");
        assert_eq!(Amount::parse("100").unwrap().to_string(), "100.00");
        assert_eq!(Amount::parse("100.0").unwrap().to_string(), "100.00");
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(Amount::from_f64(50000.756).unwrap().to_string(), "50000.76");
        assert_eq!(Amount::parse("0.125").unwrap().to_string(), "0.13");
        assert_eq!(Amount::parse("-0.125").unwrap().to_string(), "-0.13");
        assert_eq!(Amount::parse("0.124").unwrap().to_string(), "0.12");
    }

    #[test]
    fn negative_zero_renders_unsigned() {
        assert_eq!(Amount::from_f64(-0.0).unwrap().to_string(), "0.00");
        assert_eq!(Amount::parse("-0.001").unwrap().to_string(), "0.00");
    }

    #[test]
    fn rounding_is_reported() {
        let (_, exact) = Amount::parse_reporting("12.50").unwrap();
        assert_eq!(exact, Rounding::Exact);
        let (_, rounded) = Amount::parse_reporting("12.501").unwrap();
        assert_eq!(rounded, Rounding::Rounded);
    }

    #[test]
    fn shares_use_four_places() {
        assert_eq!(Share::parse("0.5").unwrap().to_string(), "0.5000");
        assert_eq!(Share::from_f64(1.0 / 3.0).unwrap().to_string(), "0.3333");
    }

    #[test]
    fn rejects_non_finite_and_malformed() {
        assert!(Amount::from_f64(f64::NAN).is_err());
        assert!(Amount::from_f64(f64::INFINITY).is_err());
        assert!(Amount::parse("1e5").is_err());
        assert!(Amount::parse("12,00").is_err());
    }
}
