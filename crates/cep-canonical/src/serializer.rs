use canonical_json::to_string;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::{Amount, Rounding, Share};
use crate::digest::CanonicalHash;
use crate::hygiene::{HygieneReport, HygieneStatus, HygieneWarning};
use crate::identifiers::ProfileId;
use crate::timestamp::CanonicalTimestamp;
use crate::validation::ValidationError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Error returned when serialization fails.
#[derive(thiserror::Error, Debug)]
pub enum SerializeError {
    /// The input does not have the shape of a record.
    #[error("invalid structure at {0}")]
    InvalidStructure(String),
    /// A non-integer number appeared under a key with no amount or share hint.
    #[error("unhinted floating-point number at {0}")]
    UnhintedFloat(String),
    /// Non-finite number (NaN/Infinity) detected.
    #[error("non-finite number detected at {0}")]
    NonFiniteNumber(String),
    /// A hinted value failed to parse.
    #[error("invalid value at {path}: {source}")]
    InvalidValue {
        /// Location of the value.
        path: String,
        /// Underlying validation failure.
        #[source]
        source: ValidationError,
    },
    /// The JSON encoder rejected the rendered record.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// A typed value inside a [`CanonicalRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free text, rendered as-is.
    Text(String),
    /// Integer, rendered in base 10 without separators.
    Integer(i128),
    /// Monetary amount, two decimal places.
    Amount(Amount),
    /// Ratio, four decimal places.
    Share(Share),
    /// UTC timestamp, six fractional digits.
    Timestamp(CanonicalTimestamp),
    /// Boolean, rendered as `"true"` / `"false"`.
    Bool(bool),
    /// Nested record, rendered as its own canonical string.
    Record(CanonicalRecord),
    /// Ordered sequence; order is significant.
    List(Vec<FieldValue>),
    /// Unordered collection; rendered sorted and de-duplicated.
    Set(Vec<FieldValue>),
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(i128::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Integer(i128::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(i128::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Amount> for FieldValue {
    fn from(value: Amount) -> Self {
        FieldValue::Amount(value)
    }
}

impl From<Share> for FieldValue {
    fn from(value: Share) -> Self {
        FieldValue::Share(value)
    }
}

impl From<CanonicalTimestamp> for FieldValue {
    fn from(value: CanonicalTimestamp) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<CanonicalHash> for FieldValue {
    fn from(value: CanonicalHash) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<CanonicalRecord> for FieldValue {
    fn from(value: CanonicalRecord) -> Self {
        FieldValue::Record(value)
    }
}

/// A mapping of field name to typed value with a single canonical rendering.
///
/// Keys render in lexicographic order and every leaf renders as a string, so
/// the output never depends on insertion order or on platform number formatting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Inserts a field only when a value is present; `None` leaves the key absent.
    pub fn insert_if_present<V: Into<FieldValue>>(
        &mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.fields.insert(key.into(), value.into());
        }
        self
    }

    /// Looks up a field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Removes a field, returning it.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in canonical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Renders the record to a JSON object whose leaves are all strings.
    pub fn to_value(&self) -> Result<Value, SerializeError> {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.fields {
            map.insert(key.clone(), render(value)?);
        }
        Ok(Value::Object(map))
    }

    /// Canonical string form.
    pub fn to_canonical_string(&self) -> Result<String, SerializeError> {
        to_string(&self.to_value()?).map_err(|err| SerializeError::Encoding(err.to_string()))
    }

    /// SHA-256 of the canonical string.
    pub fn canonical_hash(&self) -> Result<CanonicalHash, SerializeError> {
        Ok(CanonicalHash::of(self.to_canonical_string()?.as_bytes()))
    }
}

fn render(value: &FieldValue) -> Result<Value, SerializeError> {
    Ok(match value {
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Integer(int) => Value::String(int.to_string()),
        FieldValue::Amount(amount) => Value::String(amount.to_string()),
        FieldValue::Share(share) => Value::String(share.to_string()),
        FieldValue::Timestamp(ts) => Value::String(ts.to_canonical_string()),
        FieldValue::Bool(flag) => Value::String(flag.to_string()),
        FieldValue::Record(record) => Value::String(record.to_canonical_string()?),
        FieldValue::List(items) => Value::Array(items.iter().map(render).collect::<Result<_, _>>()?),
        FieldValue::Set(items) => {
            let mut keyed = Vec::with_capacity(items.len());
            for item in items {
                let rendered = render(item)?;
                let sort_key =
                    to_string(&rendered).map_err(|err| SerializeError::Encoding(err.to_string()))?;
                keyed.push((sort_key, rendered));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            keyed.dedup_by(|a, b| a.0 == b.0);
            Value::Array(keyed.into_iter().map(|(_, rendered)| rendered).collect())
        }
    })
}

/// Types with a canonical record form.
pub trait Canonicalize {
    /// Builds the canonical record for this value.
    fn canonical_record(&self) -> CanonicalRecord;

    /// Canonical string form.
    fn to_canonical_string(&self) -> Result<String, SerializeError> {
        self.canonical_record().to_canonical_string()
    }

    /// SHA-256 of the canonical string form.
    fn canonical_hash(&self) -> Result<CanonicalHash, SerializeError> {
        self.canonical_record().canonical_hash()
    }
}

impl Canonicalize for CanonicalRecord {
    fn canonical_record(&self) -> CanonicalRecord {
        self.clone()
    }
}

/// Canonical bytes for any [`Canonicalize`] value.
pub fn serialize_canonical<T: Canonicalize + ?Sized>(value: &T) -> Result<Vec<u8>, SerializeError> {
    value.to_canonical_string().map(String::into_bytes)
}

/// Key hints that type untyped JSON values.
///
/// JSON carries no distinction between an amount, a timestamp and free text,
/// nor between ordered lists and sets. Hints name the keys (at any depth)
/// whose values take the typed rendering. Array elements inherit their
/// parent key's hint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializationProfile {
    /// Keys rendered as two-decimal amounts.
    #[serde(default)]
    pub amount_keys: BTreeSet<String>,
    /// Keys rendered as four-decimal shares.
    #[serde(default)]
    pub share_keys: BTreeSet<String>,
    /// Keys rendered as canonical timestamps.
    #[serde(default)]
    pub timestamp_keys: BTreeSet<String>,
    /// Keys whose arrays are sets.
    #[serde(default)]
    pub set_keys: BTreeSet<String>,
}

impl SerializationProfile {
    /// Hints for the envelope and payload fields of civic exchange records.
    pub fn civic_records() -> Self {
        let strings = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect();
        Self {
            amount_keys: strings(&["amount"]),
            share_keys: strings(&["participationShare"]),
            timestamp_keys: strings(&[
                "firstSeenAt",
                "lastUpdatedAt",
                "validFrom",
                "validTo",
                "attestationTimestamp",
                "occurredTimestamp",
                "effectiveTimestamp",
                "expirationTimestamp",
                "effectiveDate",
            ]),
            set_keys: strings(&["members", "sourceReferences"]),
        }
    }

    /// Adds an amount key.
    pub fn with_amount_key(mut self, key: impl Into<String>) -> Self {
        self.amount_keys.insert(key.into());
        self
    }

    /// Adds a timestamp key.
    pub fn with_timestamp_key(mut self, key: impl Into<String>) -> Self {
        self.timestamp_keys.insert(key.into());
        self
    }

    /// Adds a set key.
    pub fn with_set_key(mut self, key: impl Into<String>) -> Self {
        self.set_keys.insert(key.into());
        self
    }
}

/// Result of serialization.
#[derive(Debug)]
pub struct SerializationResult {
    /// Canonical text.
    pub text: String,
    /// Hygiene report describing adjustments made.
    pub report: HygieneReport,
}

impl SerializationResult {
    /// Canonical UTF-8 bytes.
    pub fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

/// Helper for building JSON paths during conversion.
#[derive(Debug, Clone)]
struct Path {
    segments: Vec<String>,
}

impl Path {
    fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    fn push_field(&self, field: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(field.to_string());
        Self { segments }
    }

    fn push_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(format!("[{}]", index));
        Self { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.segments.join("."))
        }
    }
}

/// Serializer that emits canonical bytes under a named profile.
#[derive(Debug, Clone)]
pub struct CanonicalSerializer {
    profile: ProfileId,
}

impl Default for CanonicalSerializer {
    fn default() -> Self {
        Self::new(ProfileId::default_profile())
    }
}

impl CanonicalSerializer {
    /// Creates a serializer for the provided profile.
    pub fn new(profile: ProfileId) -> Self {
        Self { profile }
    }

    /// Profile recorded in every report.
    pub fn profile(&self) -> &ProfileId {
        &self.profile
    }

    /// Serializes a typed record.
    pub fn serialize<T: Canonicalize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<SerializationResult, SerializeError> {
        let text = value.to_canonical_string()?;
        let mut report = HygieneReport::new(self.profile.clone());
        report
            .metrics
            .insert("fields".to_string(), value.canonical_record().len() as u64);
        Ok(SerializationResult { text, report })
    }

    /// Serializes an untyped JSON object using key hints.
    pub fn serialize_json(
        &self,
        value: &Value,
        hints: &SerializationProfile,
    ) -> Result<SerializationResult, SerializeError> {
        self.serialize_json_with_report(value, hints)
            .map_err(|(err, _)| err)
    }

    /// Like [`serialize_json`](Self::serialize_json) but returns the report on error too.
    pub fn serialize_json_with_report(
        &self,
        value: &Value,
        hints: &SerializationProfile,
    ) -> Result<SerializationResult, (SerializeError, HygieneReport)> {
        let mut report = HygieneReport::new(self.profile.clone());
        let record = match self.record_from_json(value, hints, &mut report) {
            Ok(record) => record,
            Err(err) => {
                report.status = HygieneStatus::Invalid;
                return Err((err, report));
            }
        };
        match record.to_canonical_string() {
            Ok(text) => Ok(SerializationResult { text, report }),
            Err(err) => {
                report.status = HygieneStatus::Invalid;
                Err((err, report))
            }
        }
    }

    /// Converts a JSON object into a typed record.
    pub fn record_from_json(
        &self,
        value: &Value,
        hints: &SerializationProfile,
        report: &mut HygieneReport,
    ) -> Result<CanonicalRecord, SerializeError> {
        match value {
            Value::Object(_) => self.convert_object(value, Path::root(), hints, report),
            _ => Err(SerializeError::InvalidStructure(
                "root: expected an object".to_string(),
            )),
        }
    }

    fn convert_object(
        &self,
        value: &Value,
        path: Path,
        hints: &SerializationProfile,
        report: &mut HygieneReport,
    ) -> Result<CanonicalRecord, SerializeError> {
        let Value::Object(map) = value else {
            return Err(SerializeError::InvalidStructure(format!(
                "{}: expected an object",
                path
            )));
        };
        let mut record = CanonicalRecord::new();
        for (key, child) in map {
            let child_path = path.push_field(key);
            match self.convert(child, key, child_path.clone(), hints, report)? {
                Some(converted) => {
                    record.insert(key.clone(), converted);
                }
                None => {
                    report
                        .warnings
                        .push(HygieneWarning::new(format!("NullOmitted:{}", child_path)));
                    report.bump("omitted_nulls");
                }
            }
        }
        Ok(record)
    }

    #[allow(clippy::only_used_in_recursion)]
    fn convert(
        &self,
        value: &Value,
        key: &str,
        path: Path,
        hints: &SerializationProfile,
        report: &mut HygieneReport,
    ) -> Result<Option<FieldValue>, SerializeError> {
        let converted = match value {
            Value::Null => return Ok(None),
            Value::Object(_) => {
                FieldValue::Record(self.convert_object(value, path, hints, report)?)
            }
            Value::Array(items) => {
                let mut converted = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    let item_path = path.push_index(idx);
                    match self.convert(item, key, item_path.clone(), hints, report)? {
                        Some(value) => converted.push(value),
                        None => {
                            return Err(SerializeError::InvalidStructure(format!(
                                "{}: null inside array",
                                item_path
                            )))
                        }
                    }
                }
                if hints.set_keys.contains(key) {
                    FieldValue::Set(converted)
                } else {
                    FieldValue::List(converted)
                }
            }
            Value::Bool(flag) => FieldValue::Bool(*flag),
            Value::String(text) => self.convert_text(text, key, &path, hints, report)?,
            Value::Number(num) => {
                if let Some(int) = num.as_i64() {
                    self.convert_integer(int, key, hints)
                } else if let Some(int) = num.as_u64() {
                    if hints.amount_keys.contains(key) || hints.share_keys.contains(key) {
                        self.convert_text(&int.to_string(), key, &path, hints, report)?
                    } else {
                        FieldValue::Integer(i128::from(int))
                    }
                } else {
                    let float = num
                        .as_f64()
                        .ok_or_else(|| SerializeError::NonFiniteNumber(path.to_string()))?;
                    if !float.is_finite() {
                        return Err(SerializeError::NonFiniteNumber(path.to_string()));
                    }
                    self.convert_float(float, key, &path, hints, report)?
                }
            }
        };
        Ok(Some(converted))
    }

    fn convert_integer(&self, int: i64, key: &str, hints: &SerializationProfile) -> FieldValue {
        if hints.amount_keys.contains(key) {
            FieldValue::Amount(Amount::from_i64(int))
        } else if hints.share_keys.contains(key) {
            FieldValue::Share(Share::from_i64(int))
        } else {
            FieldValue::Integer(i128::from(int))
        }
    }

    fn convert_float(
        &self,
        float: f64,
        key: &str,
        path: &Path,
        hints: &SerializationProfile,
        report: &mut HygieneReport,
    ) -> Result<FieldValue, SerializeError> {
        let invalid = |source| SerializeError::InvalidValue {
            path: path.to_string(),
            source,
        };
        if hints.amount_keys.contains(key) {
            let (amount, rounding) = Amount::from_f64_reporting(float).map_err(invalid)?;
            self.note_rounding(rounding, path, report);
            Ok(FieldValue::Amount(amount))
        } else if hints.share_keys.contains(key) {
            let (share, rounding) = Share::from_f64_reporting(float).map_err(invalid)?;
            self.note_rounding(rounding, path, report);
            Ok(FieldValue::Share(share))
        } else {
            Err(SerializeError::UnhintedFloat(path.to_string()))
        }
    }

    fn convert_text(
        &self,
        text: &str,
        key: &str,
        path: &Path,
        hints: &SerializationProfile,
        report: &mut HygieneReport,
    ) -> Result<FieldValue, SerializeError> {
        let invalid = |source| SerializeError::InvalidValue {
            path: path.to_string(),
            source,
        };
        if hints.amount_keys.contains(key) {
            let (amount, rounding) = Amount::parse_reporting(text).map_err(invalid)?;
            self.note_rounding(rounding, path, report);
            Ok(FieldValue::Amount(amount))
        } else if hints.share_keys.contains(key) {
            let (share, rounding) = Share::parse_reporting(text).map_err(invalid)?;
            self.note_rounding(rounding, path, report);
            Ok(FieldValue::Share(share))
        } else if hints.timestamp_keys.contains(key) {
            Ok(FieldValue::Timestamp(
                CanonicalTimestamp::parse(text).map_err(invalid)?,
            ))
        } else {
            Ok(FieldValue::Text(text.to_string()))
        }
    }

    fn note_rounding(&self, rounding: Rounding, path: &Path, report: &mut HygieneReport) {
        if rounding == Rounding::Rounded {
            report.record_lossy("rounded_values", format!("Rounded:{}", path));
        }
    }
}
