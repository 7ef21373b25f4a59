//! Metadata Records and Filters
//!
//! The store keeps a flat `field -> value` record per item and evaluates
//! filters against it. Fields are AND-ed; a list filter value is an OR over
//! its elements. A field missing from the record never matches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// STORED RECORD
// ============================================================================

/// A single stored metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag (e.g. `is_live_performance`)
    Bool(bool),
    /// Numeric value (e.g. `tempo`, `duration`)
    Number(f64),
    /// Free text (e.g. `genre`)
    Text(String),
    /// Ordered list of text (e.g. `mood`, `instrumentation`)
    List(Vec<String>),
}

impl MetadataValue {
    /// Whether this stored value satisfies a single scalar comparison.
    ///
    /// Lists match when they contain the value.
    fn matches_scalar(&self, wanted: &MetadataValue) -> bool {
        match (self, wanted) {
            (MetadataValue::List(items), MetadataValue::Text(t)) => items.iter().any(|i| i == t),
            (MetadataValue::Number(a), MetadataValue::Number(b)) => a == b,
            (stored, wanted) => stored == wanted,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

/// Flat metadata record as stored alongside each id
pub type MetadataRecord = BTreeMap<String, MetadataValue>;

// ============================================================================
// FILTER
// ============================================================================

/// Constraint on one metadata field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Field must equal this value
    Exact(MetadataValue),
    /// Field must equal any one of these values
    AnyOf(Vec<MetadataValue>),
}

/// Conjunction of per-field constraints. Empty means "no filtering".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    fields: BTreeMap<String, FilterValue>,
}

impl MetadataFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`
    pub fn with_exact(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.fields
            .insert(field.into(), FilterValue::Exact(value.into()));
        self
    }

    /// Require `field` to equal one of `values`. An empty list adds nothing.
    pub fn with_any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MetadataValue>,
    {
        let values: Vec<MetadataValue> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.fields.insert(field.into(), FilterValue::AnyOf(values));
        }
        self
    }

    /// True when no field is constrained
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of constrained fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Constraint for a field, if any
    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.fields.get(field)
    }

    /// Iterate constraints in field-name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.fields.iter()
    }

    /// Evaluate the filter against a stored record
    pub fn matches(&self, record: &MetadataRecord) -> bool {
        self.fields.iter().all(|(field, constraint)| {
            let Some(stored) = record.get(field) else {
                return false;
            };
            match constraint {
                FilterValue::Exact(wanted) => stored.matches_scalar(wanted),
                FilterValue::AnyOf(options) => options.iter().any(|o| stored.matches_scalar(o)),
            }
        })
    }

    /// Evaluate against a record that may be absent
    pub fn matches_opt(&self, record: Option<&MetadataRecord>) -> bool {
        match record {
            Some(r) => self.matches(r),
            None => self.is_empty(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
