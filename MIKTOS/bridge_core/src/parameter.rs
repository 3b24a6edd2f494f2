use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a parsed parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterKind {
    /// Scalar number.
    Numeric,
    /// Free text.
    String,
    /// True/false flag.
    Boolean,
    /// Fixed-length numeric tuple (location, size, colour).
    Vector,
    /// Text restricted to a closed vocabulary.
    Enum,
    /// Kind could not be determined.
    Unknown,
}

impl ParameterKind {
    /// Returns a short label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Vector => "vector",
            Self::Enum => "enum",
            Self::Unknown => "unknown",
        }
    }

    /// Maps the loosely named type strings found in legacy payloads.
    #[must_use]
    pub fn from_legacy(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "numeric" | "number" | "float" | "int" | "integer" => Some(Self::Numeric),
            "string" | "str" | "text" => Some(Self::String),
            "bool" | "boolean" => Some(Self::Boolean),
            "vector" | "vector3" | "coordinate" | "color" | "colour" => Some(Self::Vector),
            "enum" | "choice" => Some(Self::Enum),
            _ => None,
        }
    }

    /// Whether a value of this kind can hold `value`.
    #[must_use]
    pub fn accepts(self, value: &ParameterValue) -> bool {
        match self {
            Self::Numeric => value.as_f64().is_some(),
            Self::String | Self::Enum => value.as_text().is_some(),
            Self::Boolean => value.as_flag().is_some(),
            Self::Vector => value.as_vector().is_some(),
            Self::Unknown => false,
        }
    }
}

/// Runtime value of a parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Scalar number.
    Number(f64),
    /// Boolean flag.
    Flag(bool),
    /// Text or enumerated choice.
    Text(String),
    /// Numeric tuple.
    Vector(Vec<f64>),
    /// Untyped payload received from an external caller.
    Raw(serde_json::Value),
}

impl Default for ParameterValue {
    fn default() -> Self {
        Self::Raw(serde_json::Value::Null)
    }
}

impl ParameterValue {
    /// Infers a kind from the runtime shape of the value.
    #[must_use]
    pub fn infer_kind(&self) -> Option<ParameterKind> {
        match self {
            Self::Number(_) => Some(ParameterKind::Numeric),
            Self::Flag(_) => Some(ParameterKind::Boolean),
            Self::Text(_) => Some(ParameterKind::String),
            Self::Vector(_) => Some(ParameterKind::Vector),
            Self::Raw(raw) => match raw {
                serde_json::Value::Number(_) => Some(ParameterKind::Numeric),
                serde_json::Value::Bool(_) => Some(ParameterKind::Boolean),
                serde_json::Value::String(_) => Some(ParameterKind::String),
                serde_json::Value::Array(_) if self.as_vector().is_some() => {
                    Some(ParameterKind::Vector)
                }
                _ => None,
            },
        }
    }

    /// Numeric view.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Raw(serde_json::Value::Number(number)) => number.as_f64(),
            _ => None,
        }
    }

    /// Text view.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Raw(serde_json::Value::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Boolean view.
    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            Self::Raw(serde_json::Value::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Vector view; raw arrays qualify only when every element is numeric.
    #[must_use]
    pub fn as_vector(&self) -> Option<Vec<f64>> {
        match self {
            Self::Vector(values) => Some(values.clone()),
            Self::Raw(serde_json::Value::Array(items)) if !items.is_empty() => {
                items.iter().map(serde_json::Value::as_f64).collect()
            }
            _ => None,
        }
    }

    /// JSON form handed to the bridge.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(value) => serde_json::json!(value),
            Self::Flag(value) => serde_json::json!(value),
            Self::Text(value) => serde_json::json!(value),
            Self::Vector(values) => serde_json::json!(values),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Flag(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Vector(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

/// Byte offsets into the normalised command text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpan {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

fn default_confidence() -> f32 {
    1.0
}

/// One extracted argument of a command.
///
/// Payloads coming from older producers may omit `kind` and instead carry a
/// loosely named `param_type` / `data_type`; both spellings deserialize into
/// [`ParsedParameter::legacy_type`]. Use [`ParsedParameter::resolved_kind`]
/// rather than reading `kind` directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedParameter {
    /// Slot name, e.g. `size`.
    pub name: String,
    /// Extracted value; absent in malformed payloads.
    #[serde(default)]
    pub value: ParameterValue,
    /// Declared kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParameterKind>,
    /// Alternate type name used by legacy payloads.
    #[serde(
        default,
        alias = "param_type",
        alias = "data_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_type: Option<String>,
    /// Extraction certainty in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Offsets of the phrase the value came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_span: Option<SourceSpan>,
    /// Closed vocabulary for [`ParameterKind::Enum`] parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl ParsedParameter {
    fn typed(
        name: impl Into<String>,
        value: ParameterValue,
        kind: ParameterKind,
        confidence: f32,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            kind: Some(kind),
            legacy_type: None,
            confidence: confidence.clamp(0.0, 1.0),
            source_span: None,
            allowed: Vec::new(),
        }
    }

    /// Numeric parameter.
    #[must_use]
    pub fn numeric(name: impl Into<String>, value: f64, confidence: f32) -> Self {
        Self::typed(name, ParameterValue::Number(value), ParameterKind::Numeric, confidence)
    }

    /// Free-text parameter.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>, confidence: f32) -> Self {
        Self::typed(
            name,
            ParameterValue::Text(value.into()),
            ParameterKind::String,
            confidence,
        )
    }

    /// Boolean parameter.
    #[must_use]
    pub fn flag(name: impl Into<String>, value: bool, confidence: f32) -> Self {
        Self::typed(name, ParameterValue::Flag(value), ParameterKind::Boolean, confidence)
    }

    /// Vector parameter.
    #[must_use]
    pub fn vector(name: impl Into<String>, values: Vec<f64>, confidence: f32) -> Self {
        Self::typed(
            name,
            ParameterValue::Vector(values),
            ParameterKind::Vector,
            confidence,
        )
    }

    /// Enumerated parameter restricted to `allowed`.
    #[must_use]
    pub fn enumerated(
        name: impl Into<String>,
        value: impl Into<String>,
        allowed: &[&str],
        confidence: f32,
    ) -> Self {
        let mut param = Self::typed(
            name,
            ParameterValue::Text(value.into()),
            ParameterKind::Enum,
            confidence,
        );
        param.allowed = allowed.iter().map(|choice| (*choice).to_string()).collect();
        param
    }

    /// Records where in the command the value was found.
    #[must_use]
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.source_span = Some(SourceSpan { start, end });
        self
    }

    /// Copy of the parameter carrying a replacement value.
    #[must_use]
    pub fn with_value(&self, value: ParameterValue) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    /// Resolves the effective kind: explicit kind, then the legacy type name,
    /// then inference from the value. An explicit or legacy kind that
    /// contradicts the value resolves to [`ParameterKind::Unknown`].
    #[must_use]
    pub fn resolved_kind(&self) -> ParameterKind {
        let declared = self
            .kind
            .filter(|kind| *kind != ParameterKind::Unknown)
            .or_else(|| {
                self.legacy_type
                    .as_deref()
                    .and_then(ParameterKind::from_legacy)
            });
        match declared {
            Some(kind) if kind.accepts(&self.value) => kind,
            Some(_) => ParameterKind::Unknown,
            None => self
                .value
                .infer_kind()
                .unwrap_or(ParameterKind::Unknown),
        }
    }

    /// Whether the declared kind agrees with the runtime value.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.kind.map_or(false, |kind| kind.accepts(&self.value))
    }

    /// Numeric value, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Text value, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.value.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_are_consistent() {
        assert!(ParsedParameter::numeric("size", 2.0, 0.9).is_consistent());
        assert!(ParsedParameter::vector("location", vec![0.0, 1.0, 2.0], 0.9).is_consistent());
        assert!(ParsedParameter::enumerated("shape", "cube", &["cube"], 0.9).is_consistent());
    }

    #[test]
    fn legacy_type_names_resolve() {
        let payload = serde_json::json!({
            "name": "subdivisions",
            "value": 3,
            "data_type": "numeric",
            "confidence": 0.8
        });
        let param: ParsedParameter = serde_json::from_value(payload).unwrap();
        assert!(param.kind.is_none());
        assert_eq!(param.legacy_type.as_deref(), Some("numeric"));
        assert_eq!(param.resolved_kind(), ParameterKind::Numeric);

        let payload = serde_json::json!({
            "name": "location",
            "value": [1.0, 2.0, 3.0],
            "param_type": "coordinate"
        });
        let param: ParsedParameter = serde_json::from_value(payload).unwrap();
        assert_eq!(param.resolved_kind(), ParameterKind::Vector);
    }

    #[test]
    fn falls_back_to_value_inference_then_unknown() {
        let inferred: ParsedParameter =
            serde_json::from_value(serde_json::json!({"name": "flag", "value": true})).unwrap();
        assert_eq!(inferred.resolved_kind(), ParameterKind::Boolean);

        let opaque: ParsedParameter =
            serde_json::from_value(serde_json::json!({"name": "size", "value": null})).unwrap();
        assert_eq!(opaque.resolved_kind(), ParameterKind::Unknown);

        let nested: ParsedParameter = serde_json::from_value(
            serde_json::json!({"name": "size", "value": {"w": 1}, "data_type": "mystery"}),
        )
        .unwrap();
        assert_eq!(nested.resolved_kind(), ParameterKind::Unknown);
    }

    #[test]
    fn contradicting_kind_is_unknown() {
        let mut param = ParsedParameter::numeric("size", 2.0, 1.0);
        param.value = ParameterValue::Text("huge".into());
        assert!(!param.is_consistent());
        assert_eq!(param.resolved_kind(), ParameterKind::Unknown);
    }
}
