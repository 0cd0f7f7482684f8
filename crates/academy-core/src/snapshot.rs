//! State snapshot handling
//!
//! The whole application document (every entity collection) is synchronized
//! as one unit. A snapshot is always replaced wholesale; the only merge that
//! ever happens is the shallow merge onto the schema-complete default, so
//! older documents missing newer collections still produce a valid snapshot.
//!
//! Documents read back from local storage are salvaged field by field.
//! Documents arriving from the remote store are all-or-nothing: one mistyped
//! collection rejects the whole document, since applying it would wipe that
//! collection everywhere.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Collections every snapshot carries
pub const COLLECTIONS: &[&str] = &[
    "students",
    "classes",
    "attendance",
    "progress",
    "consultations",
];

/// Errors that can occur when building or editing a snapshot
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Expected a JSON object for the state document, found {0}")]
    NotAnObject(&'static str),

    #[error("'{0}' is not a collection")]
    NotACollection(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Collection '{collection}' should be an array, found {found}")]
    MistypedCollection {
        collection: String,
        found: &'static str,
    },
}

/// The complete application document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(Map<String, Value>);

impl Default for Snapshot {
    fn default() -> Self {
        let mut fields = Map::new();
        for name in COLLECTIONS {
            fields.insert((*name).to_string(), Value::Array(Vec::new()));
        }
        Self(fields)
    }
}

impl Snapshot {
    /// Build a snapshot from an arbitrary JSON document
    ///
    /// The document must be an object. Its fields are merged onto the default
    /// snapshot; a field whose JSON type disagrees with the default is dropped.
    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        match value {
            Value::Object(fields) => Ok(Self::merged_onto_default(fields)),
            other => Err(SnapshotError::NotAnObject(json_kind(&other))),
        }
    }

    /// Build a snapshot from a document received from the remote store
    ///
    /// Unlike [`Snapshot::from_value`], a known collection holding anything
    /// but an array rejects the whole document.
    pub fn from_remote_value(value: Value) -> Result<Self, SnapshotError> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(SnapshotError::NotAnObject(json_kind(&other))),
        };

        for name in COLLECTIONS {
            match fields.get(*name) {
                Some(value) if !value.is_array() => {
                    return Err(SnapshotError::MistypedCollection {
                        collection: (*name).to_string(),
                        found: json_kind(value),
                    });
                }
                _ => {}
            }
        }

        Ok(Self::merged_onto_default(fields))
    }

    /// Parse a snapshot from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    fn merged_onto_default(fields: Map<String, Value>) -> Self {
        let mut snapshot = Self::default();
        for (key, value) in fields {
            match snapshot.0.get(&key) {
                Some(expected) if json_kind(expected) != json_kind(&value) => {
                    warn!(
                        field = %key,
                        expected = json_kind(expected),
                        found = json_kind(&value),
                        "Dropping field with unexpected type"
                    );
                }
                _ => {
                    snapshot.0.insert(key, value);
                }
            }
        }
        snapshot
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Serialize to pretty-printed JSON text
    pub fn to_json_pretty(&self) -> String {
        // A map of JSON values always serializes
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }

    /// Top-level field access
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Records of a collection (empty if the collection is missing)
    pub fn records(&self, collection: &str) -> &[Value] {
        match self.0.get(collection) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        }
    }

    /// Insert a record, or replace the one with the same `id`
    ///
    /// Records without an `id` are assigned a new UUID. Returns the record's id.
    pub fn upsert_record(
        &mut self,
        collection: &str,
        record: Value,
    ) -> Result<String, SnapshotError> {
        let mut fields = match record {
            Value::Object(fields) => fields,
            other => {
                return Err(SnapshotError::InvalidRecord(format!(
                    "expected an object, found {}",
                    json_kind(&other)
                )))
            }
        };

        let id = match fields.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(SnapshotError::InvalidRecord(format!(
                    "id must be a string or number, found {}",
                    json_kind(other)
                )))
            }
            None => {
                let id = Uuid::new_v4().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let items = self.collection_mut(collection)?;
        let record = Value::Object(fields);
        match items.iter_mut().find(|item| record_id(item).as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = record,
            None => items.push(record),
        }

        Ok(id)
    }

    /// Remove the record with the given id; returns whether one was removed
    pub fn remove_record(&mut self, collection: &str, id: &str) -> Result<bool, SnapshotError> {
        let items = self.collection_mut(collection)?;
        let before = items.len();
        items.retain(|item| record_id(item).as_deref() != Some(id));
        Ok(items.len() != before)
    }

    /// Record counts of every array-valued field, in key order
    pub fn collection_counts(&self) -> Vec<(String, usize)> {
        self.0
            .iter()
            .filter_map(|(name, value)| value.as_array().map(|items| (name.clone(), items.len())))
            .collect()
    }

    fn collection_mut(&mut self, collection: &str) -> Result<&mut Vec<Value>, SnapshotError> {
        let entry = self
            .0
            .entry(collection.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        entry
            .as_array_mut()
            .ok_or_else(|| SnapshotError::NotACollection(collection.to_string()))
    }
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
