//! Document addressing and field-level patches.
//!
//! A document lives at `collection/id`, where `collection` may itself be a
//! subcollection path such as `chats/a_b/messages`.  Writes are expressed as a
//! [`Patch`]: an ordered list of operations on dotted field paths
//! (`unread.bob`, `typing.alice`).

use std::fmt;

use chrono::{DateTime, Utc};
use palaver_shared::Timestamp;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

// ---- Paths ----

/// Location of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Path of a subcollection nested under this document.
    pub fn subcollection(&self, name: &str) -> String {
        format!("{}/{}/{}", self.collection, self.id, name)
    }

    /// Collection paths alternate `collection/doc/collection`, so they always
    /// have an odd number of non-empty segments, and ids never contain `/`.
    pub fn validate(&self) -> Result<()> {
        validate_collection(&self.collection)?;
        if self.id.is_empty() || self.id.contains('/') {
            return Err(StoreError::InvalidPath(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub(crate) fn validate_collection(collection: &str) -> Result<()> {
    let segments: Vec<&str> = collection.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) || segments.len() % 2 == 0 {
        return Err(StoreError::InvalidPath(collection.to_string()));
    }
    Ok(())
}

// ---- Snapshots ----

/// A document as delivered to readers and live feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Value,
}

// ---- Patches ----

/// A single field operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replace the field (creating intermediate maps as needed).
    Set(Value),
    /// Remove the field if present.
    Delete,
    /// Add to a numeric field; a missing or non-numeric field counts as 0.
    Increment(i64),
    /// Resolve to the store's clock when the write is applied.
    ServerTimestamp,
}

/// Ordered list of field operations applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((field.into(), FieldOp::Set(value.into())));
        self
    }

    pub fn delete(mut self, field: impl Into<String>) -> Self {
        self.ops.push((field.into(), FieldOp::Delete));
        self
    }

    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.ops.push((field.into(), FieldOp::Increment(by)));
        self
    }

    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.ops.push((field.into(), FieldOp::ServerTimestamp));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    /// Rejects empty field paths or empty segments (`a..b`).
    pub fn validate(&self) -> Result<()> {
        for (field, _) in &self.ops {
            if field.is_empty() || field.split('.').any(str::is_empty) {
                return Err(StoreError::InvalidPath(field.clone()));
            }
        }
        Ok(())
    }

    /// Apply every operation to `doc`.  Must only be called on a validated patch.
    pub(crate) fn apply(&self, doc: &mut Map<String, Value>, now: DateTime<Utc>) {
        'ops: for (field, op) in &self.ops {
            let mut segments: Vec<&str> = field.split('.').collect();
            let Some(leaf) = segments.pop() else {
                continue;
            };

            let mut target = &mut *doc;
            for segment in segments {
                let entry = target
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                match entry {
                    Value::Object(next) => target = next,
                    _ => continue 'ops,
                }
            }

            match op {
                FieldOp::Set(value) => {
                    target.insert(leaf.to_string(), value.clone());
                }
                FieldOp::Delete => {
                    target.remove(leaf);
                }
                FieldOp::Increment(by) => {
                    let current = target.get(leaf).and_then(Value::as_i64).unwrap_or(0);
                    target.insert(leaf.to_string(), Value::from(current.saturating_add(*by)));
                }
                FieldOp::ServerTimestamp => {
                    let stamp = serde_json::to_value(Timestamp::server(now)).unwrap_or(Value::Null);
                    target.insert(leaf.to_string(), stamp);
                }
            }
        }
    }
}

/// Look up a dotted field path inside a document.
pub(crate) fn lookup<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(data, |value, segment| value.as_object()?.get(segment))
}
