use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field name is empty")]
    EmptyFieldName,
    #[error("invalid field name `{0}` (expected snake_case: [a-z][a-z0-9_]*)")]
    InvalidFieldName(String),
    #[error("field `{0}` has an empty label")]
    EmptyLabel(String),
    #[error("duplicate field `{0}` in schema")]
    DuplicateField(String),
}

/// Internal key of a data point the inquiry collects, e.g. `unit_price`.
/// Snake_case only; labels carry the human-readable form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FieldName(String);

impl FieldName {
    pub fn new(raw: &str) -> Result<Self, SchemaError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SchemaError::EmptyFieldName);
        }

        let starts_lower = trimmed.chars().next().is_some_and(|ch| ch.is_ascii_lowercase());
        let body_ok = trimmed
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
        if !starts_lower || !body_ok {
            return Err(SchemaError::InvalidFieldName(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: FieldName,
    pub label: String,
}

impl FieldSpec {
    pub fn new(name: &str, label: &str) -> Result<Self, SchemaError> {
        let name = FieldName::new(name)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(SchemaError::EmptyLabel(name.to_string()));
        }
        Ok(Self { name, label: label.to_string() })
    }
}

/// The fixed, ordered set of fields an outreach run collects. Agreed once per
/// run before any loop starts; extraction never adds to or removes from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut seen = std::collections::BTreeSet::new();
        for spec in &fields {
            if !seen.insert(spec.name.clone()) {
                return Err(SchemaError::DuplicateField(spec.name.to_string()));
            }
        }
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    /// Looks a spec up by raw key, as returned by an extractor.
    pub fn spec_for(&self, raw_name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name.as_str() == raw_name)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.fields.iter().map(|spec| spec.label.as_str()).collect()
    }
}
