//! Report field values and the context handed to the renderer.

use std::collections::BTreeMap;
use std::fmt;

/// How [`FieldValue::NotAvailable`] renders in reports.
pub const NOT_AVAILABLE: &str = "N/D";

/// A single report field: text, numeric, or explicitly unavailable.
///
/// `NotAvailable` stays distinct from empty text and from zero so the
/// renderer can tell "no data" apart from "value is zero".
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    NotAvailable,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, FieldValue::NotAvailable)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => f.write_str(&format_number(*n)),
            FieldValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// Numbers print without the fractional part when it is zero, so DBF numeric
/// columns holding whole numbers come out as `24`, not `24.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Field map assembled by the pipeline and consumed by the renderer.
/// Iteration order is deterministic (sorted by field name).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportContext {
    fields: BTreeMap<String, FieldValue>,
}

impl ReportContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pipeline-owned canonical field.
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Insert only when the field is not present yet. Layer merges go through
    /// here so later layers never overwrite earlier bindings.
    pub fn merge_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.entry(name.into()).or_insert(value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every field rendered to its display string, for substitution and for
    /// the JSON dump.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect()
    }
}
