//! Record - the opaque unit of data handled by every store
//!
//! A record is a JSON object plus an optional stable identifier. Stores
//! decide how the identifier travels on the wire (a primary-key column, an
//! `objectId` key, a key-value key); inside the core it is kept apart from
//! the field map so records from any backend compare the same way.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::newtypes::RecordId;

/// One unit of backend data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record without identifier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from an existing field map
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { id: None, fields }
    }

    /// Build a record from a decoded JSON object
    ///
    /// The identifier is read from `id_key` when present and usable. The key
    /// stays in the field map so the record round-trips unchanged.
    pub fn from_json_object(value: Value, id_key: &str) -> Result<Self, DomainError> {
        match value {
            Value::Object(fields) => {
                let id = fields.get(id_key).and_then(RecordId::from_json);
                Ok(Self { id, fields })
            }
            other => Err(DomainError::InvalidRecord(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Sets the identifier
    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets a field
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Render the record as a JSON object with the identifier under `id_key`
    ///
    /// An identifier already present in the field map is left as is, so
    /// numeric server ids are not rewritten as strings.
    #[must_use]
    pub fn to_json_object(&self, id_key: &str) -> Value {
        let mut fields = self.fields.clone();
        if let Some(id) = &self.id {
            fields.entry(id_key.to_string()).or_insert_with(|| id.to_json());
        }
        Value::Object(fields)
    }

    /// Both records carry an identifier and the identifiers are equal
    #[must_use]
    pub fn same_identity(&self, other: &Record) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
