use std::fmt;

use serde::Serialize;

use crate::model::{AnnotationKind, SourceType, Value};

/// Literals accepted as booleans when a text column feeds a checkbox.
pub const BOOLEAN_VOCABULARY: [&str; 8] = ["true", "false", "1", "0", "oui", "non", "yes", "no"];

/// Outcome of a type compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// The value can be sent as-is.
    Compatible,
    /// The value must go through the coercer first.
    NeedsConversion,
    /// The value must not be sent.
    Incompatible,
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compatibility::Compatible => write!(f, "compatible"),
            Compatibility::NeedsConversion => write!(f, "needs_conversion"),
            Compatibility::Incompatible => write!(f, "incompatible"),
        }
    }
}

/// Decides whether a value of `source` type can be written to a `dest`
/// annotation.
///
/// The verdict comes from a fixed table keyed by both types. A text column
/// holding a non-empty `sample` is judged on the value itself for checkbox and
/// numeric destinations.
pub fn resolve(source: &SourceType, dest: &AnnotationKind, sample: Option<&Value>) -> Compatibility {
    let baseline = baseline(source, dest);

    let Some(sample) = sample.filter(|value| !value.is_empty()) else {
        return baseline;
    };
    if *source != SourceType::Text {
        return baseline;
    }

    match dest {
        AnnotationKind::Checkbox => verdict(is_boolean_literal(sample)),
        AnnotationKind::IntegerNumber => verdict(parse_integer(sample).is_some()),
        AnnotationKind::Number | AnnotationKind::DecimalNumber => {
            verdict(parse_decimal(sample).is_some())
        }
        _ => baseline,
    }
}

/// Resolves raw type names, as found in configuration or remote metadata.
pub fn resolve_names(source: &str, dest: &str, sample: Option<&Value>) -> Compatibility {
    resolve(&SourceType::parse(source), &AnnotationKind::parse(dest), sample)
}

fn baseline(source: &SourceType, dest: &AnnotationKind) -> Compatibility {
    use AnnotationKind as D;
    use Compatibility::{Compatible as C, Incompatible as I, NeedsConversion as N};

    match (source, dest) {
        (_, D::Other(_)) | (SourceType::Other(_), _) => I,
        (_, D::Text | D::Textarea) => C,

        (SourceType::Text, D::DropDownList) => C,
        (SourceType::Text, _) => N,

        (SourceType::Numeric | SourceType::Int, D::Number | D::IntegerNumber | D::DecimalNumber) => {
            C
        }
        (SourceType::Numeric | SourceType::Int, D::DropDownList) => N,
        (SourceType::Numeric | SourceType::Int, _) => I,

        (SourceType::Date, D::Date | D::Datetime) => C,
        (SourceType::Date, _) => I,

        (SourceType::DateTime, D::Datetime) => C,
        (SourceType::DateTime, D::Date) => N,
        (SourceType::DateTime, _) => I,

        (SourceType::Bool, D::Checkbox) => C,
        (SourceType::Bool, D::DropDownList) => N,
        (SourceType::Bool, _) => I,
    }
}

fn verdict(accepted: bool) -> Compatibility {
    if accepted {
        Compatibility::Compatible
    } else {
        Compatibility::Incompatible
    }
}

fn is_boolean_literal(value: &Value) -> bool {
    let literal = value.to_string().to_lowercase();
    BOOLEAN_VOCABULARY.contains(&literal.as_str())
}

pub(crate) fn parse_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => Some(*number),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => None,
        Value::Text(text) | Value::Temporal(text) => text.trim().parse::<f64>().ok(),
    }
}

/// Truncated integer value, `None` when it does not fit an `i64`.
pub(crate) fn parse_integer(value: &Value) -> Option<i64> {
    parse_float(value)
        .map(f64::trunc)
        .filter(|number| *number >= i64::MIN as f64 && *number < i64::MAX as f64)
        .map(|number| number as i64)
}

/// Finite decimal value.
pub(crate) fn parse_decimal(value: &Value) -> Option<f64> {
    parse_float(value).filter(|number| number.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_column_table_row() {
        let source = SourceType::Text;
        assert_eq!(resolve(&source, &AnnotationKind::Text, None), Compatibility::Compatible);
        assert_eq!(
            resolve(&source, &AnnotationKind::DropDownList, None),
            Compatibility::Compatible
        );
        assert_eq!(
            resolve(&source, &AnnotationKind::Checkbox, None),
            Compatibility::NeedsConversion
        );
        assert_eq!(
            resolve(&source, &AnnotationKind::Datetime, None),
            Compatibility::NeedsConversion
        );
    }

    #[test]
    fn numeric_columns_reject_booleans_and_dates() {
        for source in [SourceType::Numeric, SourceType::Int] {
            assert_eq!(
                resolve(&source, &AnnotationKind::DecimalNumber, None),
                Compatibility::Compatible
            );
            assert_eq!(
                resolve(&source, &AnnotationKind::DropDownList, None),
                Compatibility::NeedsConversion
            );
            assert_eq!(
                resolve(&source, &AnnotationKind::Checkbox, None),
                Compatibility::Incompatible
            );
            assert_eq!(resolve(&source, &AnnotationKind::Date, None), Compatibility::Incompatible);
        }
    }

    #[test]
    fn datetime_to_date_needs_conversion() {
        assert_eq!(
            resolve(&SourceType::DateTime, &AnnotationKind::Date, None),
            Compatibility::NeedsConversion
        );
        assert_eq!(
            resolve(&SourceType::Date, &AnnotationKind::Datetime, None),
            Compatibility::Compatible
        );
    }

    #[test]
    fn sample_overrides_only_apply_to_text_sources() {
        let sample = Value::from("maybe");
        assert_eq!(
            resolve(&SourceType::Text, &AnnotationKind::Checkbox, Some(&sample)),
            Compatibility::Incompatible
        );
        assert_eq!(
            resolve(&SourceType::Bool, &AnnotationKind::Checkbox, Some(&sample)),
            Compatibility::Compatible
        );
        assert_eq!(
            resolve(&SourceType::Text, &AnnotationKind::Checkbox, Some(&Value::from("NON"))),
            Compatibility::Compatible
        );
        assert_eq!(
            resolve(&SourceType::Text, &AnnotationKind::IntegerNumber, Some(&Value::from(" 12.5 "))),
            Compatibility::Compatible
        );
        assert_eq!(
            resolve(&SourceType::Text, &AnnotationKind::IntegerNumber, Some(&Value::from("inf"))),
            Compatibility::Incompatible
        );
    }

    #[test]
    fn empty_sample_keeps_baseline() {
        assert_eq!(
            resolve(&SourceType::Text, &AnnotationKind::Checkbox, Some(&Value::from(""))),
            Compatibility::NeedsConversion
        );
    }

    #[test]
    fn out_of_range_numbers_are_incompatible() {
        for literal in ["1e30", "-1e19", "inf", "NaN"] {
            assert_eq!(
                resolve(&SourceType::Text, &AnnotationKind::IntegerNumber, Some(&Value::from(literal))),
                Compatibility::Incompatible,
                "{literal}"
            );
        }
        for literal in ["inf", "-inf", "NaN"] {
            assert_eq!(
                resolve(&SourceType::Text, &AnnotationKind::DecimalNumber, Some(&Value::from(literal))),
                Compatibility::Incompatible,
                "{literal}"
            );
        }
        assert_eq!(
            resolve(&SourceType::Text, &AnnotationKind::DecimalNumber, Some(&Value::from("1e30"))),
            Compatibility::Compatible
        );
    }

    #[test]
    fn unknown_type_names_are_incompatible() {
        let sample = Value::from("x");
        assert_eq!(resolve_names("Ref:Foo", "text", None), Compatibility::Incompatible);
        assert_eq!(resolve_names("Text", "bogus", Some(&sample)), Compatibility::Incompatible);
        assert_eq!(resolve_names("", "", None), Compatibility::Incompatible);
        assert_eq!(resolve_names("Choice", "checkbox", Some(&sample)), Compatibility::Incompatible);
    }

    #[test]
    fn descriptor_names_are_normalised() {
        assert_eq!(
            resolve_names("Bool", "annotation_descriptor_CHECKBOX", None),
            Compatibility::Compatible
        );
        assert_eq!(
            resolve_names("DateTime:Europe/Paris", "Datetime", None),
            Compatibility::Compatible
        );
        assert_eq!(
            resolve_names("Text", "annotation_descriptor_integer_number", Some(&Value::from("12"))),
            Compatibility::Compatible
        );
    }
}
