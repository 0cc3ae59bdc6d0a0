use chrono::DateTime;
use tracing::warn;

use crate::convert::compat::{parse_decimal, parse_integer};
use crate::model::{AnnotationKind, CoercedValue, Value};

/// Literals read as `true` when a non-boolean value feeds a checkbox.
pub const TRUTHY_VOCABULARY: [&str; 5] = ["true", "1", "oui", "yes", "on"];

/// Converts a source value into the wire representation expected by a `dest`
/// annotation.
///
/// Returns `None` for null and empty values. A value that cannot be converted
/// is returned in its string form and the failure is logged.
pub fn coerce(value: &Value, dest: &AnnotationKind) -> Option<CoercedValue> {
    if value.is_empty() {
        return None;
    }

    let coerced = match dest {
        AnnotationKind::Checkbox => Some(CoercedValue::Bool(to_boolean(value))),
        AnnotationKind::IntegerNumber => parse_integer(value).map(CoercedValue::Integer),
        AnnotationKind::Number | AnnotationKind::DecimalNumber => {
            parse_decimal(value).map(CoercedValue::Decimal)
        }
        AnnotationKind::Date | AnnotationKind::Datetime => {
            Some(CoercedValue::Text(normalize_temporal(&value.to_string(), dest)))
        }
        _ => Some(CoercedValue::Text(value.to_string())),
    };

    Some(coerced.unwrap_or_else(|| {
        warn!(%value, dest = %dest, "value could not be converted, sending it as text");
        CoercedValue::Text(value.to_string())
    }))
}

/// Checkbox semantics for any value; booleans pass through.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        other => {
            let literal = other.to_string().to_lowercase();
            TRUTHY_VOCABULARY.contains(&literal.as_str())
        }
    }
}

fn normalize_temporal(literal: &str, dest: &AnnotationKind) -> String {
    if literal.ends_with('Z') || DateTime::parse_from_rfc3339(literal).is_ok() {
        return literal.to_string();
    }
    if !literal.contains('T') {
        return match dest {
            AnnotationKind::Datetime => format!("{literal}T00:00:00.000Z"),
            _ => literal.to_string(),
        };
    }
    format!("{literal}Z")
}
