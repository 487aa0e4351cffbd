//! Documents, collection paths and field writes.
//!
//! A document is a JSON object addressed by `(collection, id)`.  Writes are
//! expressed as [`Fields`]: a set of per-field operations that the store
//! resolves at commit time, so that server-side values such as the commit
//! timestamp never come from a client clock.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// CollectionPath
// ---------------------------------------------------------------------------

/// Slash-joined collection path, e.g. `chats` or `chats/a_b/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// A sub-collection nested under document `parent_id` of `self`.
    pub fn child(&self, parent_id: &str, name: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, parent_id, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn describe(&self, id: &str) -> String {
        format!("{}/{}", self.0, id)
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') {
        return Err(StoreError::InvalidPath(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A document as returned by reads and snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// String elements of an array field; non-string elements are skipped.
    pub fn get_str_array(&self, field: &str) -> Vec<&str> {
        self.get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Field writes
// ---------------------------------------------------------------------------

/// A single field operation, resolved by the store at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Store this literal value.
    Value(Value),
    /// Store the commit timestamp (microseconds since the Unix epoch).
    ServerTimestamp,
    /// Add each value to the array field unless already present.
    ArrayUnion(Vec<Value>),
}

/// How a write combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the document body entirely.
    Overwrite,
    /// Only the fields named in the write change; others are kept.
    Merge,
}

/// An ordered set of field writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), FieldValue::ServerTimestamp);
        self
    }

    pub fn array_union(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.0.insert(field.into(), FieldValue::ArrayUnion(values));
        self
    }

    /// Apply the writes to `existing` (or to an empty body) and return the new body.
    pub fn apply(
        &self,
        existing: Option<&Map<String, Value>>,
        mode: WriteMode,
        commit_ts: i64,
    ) -> Map<String, Value> {
        let mut body = match (mode, existing) {
            (WriteMode::Merge, Some(current)) => current.clone(),
            _ => Map::new(),
        };

        for (field, op) in &self.0 {
            match op {
                FieldValue::Value(v) => {
                    body.insert(field.clone(), v.clone());
                }
                FieldValue::ServerTimestamp => {
                    body.insert(field.clone(), Value::from(commit_ts));
                }
                FieldValue::ArrayUnion(values) => {
                    let slot = body
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        for v in values {
                            if !items.contains(v) {
                                items.push(v.clone());
                            }
                        }
                    }
                }
            }
        }

        body
    }
}
