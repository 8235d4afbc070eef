use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::contact::Contact;
use crate::domain::schema::{FieldName, FieldSchema, FieldSpec};

/// One extraction cycle's raw output: extractor keys mapped to string values,
/// before the merge policy is applied. Keys are kept raw because a backend may
/// return names outside the schema; the merge step drops those.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    values: BTreeMap<String, String>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtractedFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

/// What one merge cycle did to a record. The loop logs the dropped and
/// ignored keys; they never reach the record itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub applied: Vec<FieldName>,
    pub blank_ignored: Vec<String>,
    pub unknown_dropped: Vec<String>,
}

impl MergeSummary {
    pub fn progressed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// The unit of truth per supplier: a contact identity plus learned field
/// values. Completion is always derived from the schema, never stored.
///
/// Invariants: every stored value is non-empty after trimming, and every
/// stored key is in the schema the record was merged against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupplierRecord {
    contact: Contact,
    fields: BTreeMap<FieldName, String>,
}

impl SupplierRecord {
    pub fn new(contact: Contact) -> Self {
        Self { contact, fields: BTreeMap::new() }
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn value(&self, name: &FieldName) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_set(&self, name: &FieldName) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_complete(&self, schema: &FieldSchema) -> bool {
        schema.iter().all(|spec| self.is_set(&spec.name))
    }

    /// Schema fields without a value yet, in schema order.
    pub fn missing<'schema>(&self, schema: &'schema FieldSchema) -> Vec<&'schema FieldSpec> {
        schema.iter().filter(|spec| !self.is_set(&spec.name)).collect()
    }

    /// Merges one cycle's extraction. Non-empty values overwrite
    /// (last-writer-wins within a cycle); blank values never clear a
    /// previously learned one; keys outside the schema are dropped.
    /// Replaying the same extraction is idempotent.
    pub fn apply(&mut self, schema: &FieldSchema, extracted: &ExtractedFields) -> MergeSummary {
        let mut summary = MergeSummary::default();

        for (raw_key, raw_value) in extracted.iter() {
            let Some(spec) = schema.spec_for(raw_key) else {
                summary.unknown_dropped.push(raw_key.to_string());
                continue;
            };

            let value = raw_value.trim();
            if value.is_empty() {
                summary.blank_ignored.push(raw_key.to_string());
                continue;
            }

            self.fields.insert(spec.name.clone(), value.to_string());
            summary.applied.push(spec.name.clone());
        }

        summary
    }
}
