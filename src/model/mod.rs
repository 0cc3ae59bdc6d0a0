use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

mod kinds;

pub use kinds::{AnnotationKind, SourceType, UpdateKind};

/// Identifier assigned to a source record by its store.
pub type RecordId = i64;

/// Ordered column → value mapping of one source record.
pub type Fields = IndexMap<String, Value>;

/// Column holding the last sync status of a record.
pub const STATUS_COLUMN: &str = "sync_status";
/// Column holding the fingerprint computed at the last successful sync.
pub const HASH_COLUMN: &str = "sync_hash";
/// Column holding the timestamp of the last sync attempt.
pub const DATE_COLUMN: &str = "sync_date";
/// Column holding a human-readable summary of the last sync attempt.
pub const MESSAGE_COLUMN: &str = "sync_message";

/// Untyped scalar held by a source cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Empty cell.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Floating point number literal.
    Number(f64),
    /// Plain string literal.
    Text(String),
    /// ISO-8601 date or datetime literal.
    Temporal(String),
}

impl Value {
    /// Returns `true` for `Null` and the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) | Value::Temporal(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Mirrors the truthiness of a cell: empty text, zero, `false` and null
    /// all count as unset.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(flag) => !flag,
            Value::Number(number) => *number == 0.0,
            Value::Text(text) | Value::Temporal(text) => text.is_empty(),
        }
    }

    /// Returns the textual form of the value, `None` for `Null`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Number(number) => write!(f, "{number}"),
            Value::Text(text) | Value::Temporal(text) => f.write_str(text),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(flag),
            serde_json::Value::Number(number) => number
                .as_f64()
                .map(Value::Number)
                .unwrap_or_else(|| Value::Text(number.to_string())),
            serde_json::Value::String(text) => Value::Text(text),
            other => Value::Text(other.to_string()),
        }
    }
}

/// JSON has no infinities or NaN, so those numbers keep their text form
/// (`"inf"`, `"NaN"`) rather than becoming `null`.
impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(flag),
            Value::Number(number) => serde_json::Number::from_f64(number)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(number.to_string())),
            Value::Text(text) | Value::Temporal(text) => serde_json::Value::String(text),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Last known synchronisation state stored on a source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Status column exists but holds nothing.
    Unset,
    Pending,
    Success,
    Error,
    /// Any literal the tool does not write itself.
    Other(String),
}

impl SyncStatus {
    /// Reads the status from a cell value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => SyncStatus::Unset,
            other => match other.to_string().as_str() {
                "" => SyncStatus::Unset,
                "pending" => SyncStatus::Pending,
                "success" => SyncStatus::Success,
                "error" => SyncStatus::Error,
                literal => SyncStatus::Other(literal.to_string()),
            },
        }
    }

    /// Literal written back to the status column.
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Unset => "",
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::Other(literal) => literal,
        }
    }
}

/// One row of the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Every column of the row, bookkeeping columns included.
    pub fields: Fields,
    /// `None` when the table has no status column at all.
    pub status: Option<SyncStatus>,
    /// Fingerprint stored by the previous successful sync.
    pub fingerprint: Option<String>,
}

impl SourceRecord {
    /// Builds a record and extracts its bookkeeping columns.
    pub fn new(id: RecordId, fields: Fields) -> Self {
        let status = fields.get(STATUS_COLUMN).map(SyncStatus::from_value);
        let fingerprint = fields.get(HASH_COLUMN).and_then(Value::as_text);
        Self {
            id,
            fields,
            status,
            fingerprint,
        }
    }

    /// Returns the value of a column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Destination case as listed for a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRef {
    /// External dossier number used for lookups.
    pub number: i64,
    /// Opaque identity used for mutations.
    pub id: String,
}

/// Typed, mutable field attached to a destination case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: String,
    pub label: String,
    pub value: Option<String>,
    /// Type discovered at runtime, when the case system reports one.
    pub kind: Option<AnnotationKind>,
}

/// Value in the destination's wire representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CoercedValue {
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl fmt::Display for CoercedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercedValue::Bool(flag) => write!(f, "{flag}"),
            CoercedValue::Integer(number) => write!(f, "{number}"),
            CoercedValue::Decimal(number) => write!(f, "{number}"),
            CoercedValue::Text(text) => f.write_str(text),
        }
    }
}

/// Single generic annotation update: the kind selects the remote mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationUpdate {
    pub kind: UpdateKind,
    pub value: CoercedValue,
}

impl AnnotationUpdate {
    /// Builds the update for a destination type, stringifying the value when
    /// the type falls back to the text mutation.
    pub fn new(dest: &AnnotationKind, value: CoercedValue) -> Self {
        let kind = UpdateKind::for_annotation(dest);
        let value = match (kind, value) {
            (UpdateKind::Text | UpdateKind::DropDownList, value) => {
                CoercedValue::Text(value.to_string())
            }
            (_, value) => value,
        };
        Self { kind, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_numbers_serialise_as_text() {
        assert_eq!(serde_json::Value::from(Value::Number(2.5)), serde_json::json!(2.5));
        assert_eq!(
            serde_json::Value::from(Value::Number(f64::INFINITY)),
            serde_json::json!("inf")
        );
        assert_eq!(
            serde_json::Value::from(Value::Number(f64::NAN)),
            serde_json::json!("NaN")
        );
        assert_eq!(serde_json::Value::from(Value::Null), serde_json::Value::Null);
    }
}
