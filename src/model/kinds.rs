use std::fmt;

use serde::{Serialize, Serializer};

/// Declared type of a source column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceType {
    Text,
    Numeric,
    Int,
    Date,
    DateTime,
    Bool,
    /// Any column type the resolver has no table entry for (`Choice`, `Ref:...`).
    Other(String),
}

impl SourceType {
    /// Parses a column type name. `DateTime:<timezone>` forms map to
    /// [`SourceType::DateTime`].
    pub fn parse(name: &str) -> Self {
        match name {
            "Text" => SourceType::Text,
            "Numeric" => SourceType::Numeric,
            "Int" => SourceType::Int,
            "Date" => SourceType::Date,
            "Bool" => SourceType::Bool,
            "DateTime" => SourceType::DateTime,
            other if other.starts_with("DateTime:") => SourceType::DateTime,
            other => SourceType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SourceType::Text => "Text",
            SourceType::Numeric => "Numeric",
            SourceType::Int => "Int",
            SourceType::Date => "Date",
            SourceType::DateTime => "DateTime",
            SourceType::Bool => "Bool",
            SourceType::Other(name) => name,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Type of a destination annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Text,
    Textarea,
    Checkbox,
    Date,
    Datetime,
    Number,
    IntegerNumber,
    DecimalNumber,
    DropDownList,
    Other(String),
}

const DESCRIPTOR_PREFIX: &str = "annotation_descriptor_";

impl AnnotationKind {
    /// Parses a normalised type name (`integer_number`, `checkbox`, ...).
    /// Matching ignores case and an `annotation_descriptor_` prefix.
    pub fn parse(name: &str) -> Self {
        let lowered = name.to_lowercase();
        let normalized = lowered.strip_prefix(DESCRIPTOR_PREFIX).unwrap_or(&lowered);
        match normalized {
            "text" => AnnotationKind::Text,
            "textarea" => AnnotationKind::Textarea,
            "checkbox" => AnnotationKind::Checkbox,
            "date" => AnnotationKind::Date,
            "datetime" => AnnotationKind::Datetime,
            "number" => AnnotationKind::Number,
            "integer_number" => AnnotationKind::IntegerNumber,
            "decimal_number" => AnnotationKind::DecimalNumber,
            "drop_down_list" => AnnotationKind::DropDownList,
            other => AnnotationKind::Other(other.to_string()),
        }
    }

    /// Maps a GraphQL `__typename` of an annotation champ. Unknown typenames
    /// are treated as text.
    pub fn from_typename(typename: &str) -> Self {
        match typename {
            "TextChamp" => AnnotationKind::Text,
            "TextareaChamp" => AnnotationKind::Textarea,
            "IntegerNumberChamp" => AnnotationKind::IntegerNumber,
            "DecimalNumberChamp" | "NumberChamp" => AnnotationKind::DecimalNumber,
            "CheckboxChamp" => AnnotationKind::Checkbox,
            "DateChamp" => AnnotationKind::Date,
            "DatetimeChamp" => AnnotationKind::Datetime,
            "DropDownListChamp" => AnnotationKind::DropDownList,
            _ => AnnotationKind::Text,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AnnotationKind::Text => "text",
            AnnotationKind::Textarea => "textarea",
            AnnotationKind::Checkbox => "checkbox",
            AnnotationKind::Date => "date",
            AnnotationKind::Datetime => "datetime",
            AnnotationKind::Number => "number",
            AnnotationKind::IntegerNumber => "integer_number",
            AnnotationKind::DecimalNumber => "decimal_number",
            AnnotationKind::DropDownList => "drop_down_list",
            AnnotationKind::Other(name) => name,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, AnnotationKind::Checkbox)
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AnnotationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Remote mutation family used to write an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Text,
    Checkbox,
    Date,
    Datetime,
    IntegerNumber,
    DecimalNumber,
    DropDownList,
}

impl UpdateKind {
    /// Selects the mutation for an annotation type. `number` and unknown
    /// types go through the text mutation.
    pub fn for_annotation(kind: &AnnotationKind) -> Self {
        match kind {
            AnnotationKind::Checkbox => UpdateKind::Checkbox,
            AnnotationKind::Date => UpdateKind::Date,
            AnnotationKind::Datetime => UpdateKind::Datetime,
            AnnotationKind::IntegerNumber => UpdateKind::IntegerNumber,
            AnnotationKind::DecimalNumber => UpdateKind::DecimalNumber,
            AnnotationKind::DropDownList => UpdateKind::DropDownList,
            AnnotationKind::Text
            | AnnotationKind::Textarea
            | AnnotationKind::Number
            | AnnotationKind::Other(_) => UpdateKind::Text,
        }
    }

    /// Suffix of the `dossierModifierAnnotation<Suffix>` mutation.
    pub fn mutation_suffix(self) -> &'static str {
        match self {
            UpdateKind::Text => "Text",
            UpdateKind::Checkbox => "Checkbox",
            UpdateKind::Date => "Date",
            UpdateKind::Datetime => "Datetime",
            UpdateKind::IntegerNumber => "IntegerNumber",
            UpdateKind::DecimalNumber => "DecimalNumber",
            UpdateKind::DropDownList => "DropDownList",
        }
    }

    /// Short tag used in client mutation ids.
    pub fn tag(self) -> &'static str {
        match self {
            UpdateKind::Text => "text",
            UpdateKind::Checkbox => "checkbox",
            UpdateKind::Date => "date",
            UpdateKind::Datetime => "datetime",
            UpdateKind::IntegerNumber => "integer",
            UpdateKind::DecimalNumber => "decimal",
            UpdateKind::DropDownList => "dropdown",
        }
    }
}
