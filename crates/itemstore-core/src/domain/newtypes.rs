//! Domain newtypes with validation
//!
//! This module provides the strongly-typed record identifier. Backends hand
//! out identifiers as JSON strings or integers; both normalize to a
//! non-empty string so records from one store compare by a single scheme.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::DomainError;

/// Stable identifier of a record within one store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Create a RecordId, rejecting empty or whitespace-only values
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidRecordId(value));
        }
        Ok(Self(value))
    }

    /// Generate a random identifier for stores that assign ids locally
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Extract an identifier from a JSON value (string or integer)
    ///
    /// Returns `None` for null, booleans, floats, arrays, objects and empty
    /// strings.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::new(s.clone()).ok(),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as a JSON string value
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_rejects_empty() {
        assert!(RecordId::new("").is_err());
        assert!(RecordId::new("   ").is_err());
        assert_eq!(RecordId::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_record_id_from_json() {
        assert_eq!(RecordId::from_json(&json!("x1")).unwrap().as_str(), "x1");
        assert_eq!(RecordId::from_json(&json!(42)).unwrap().as_str(), "42");
        assert!(RecordId::from_json(&json!(1.5)).is_none());
        assert!(RecordId::from_json(&json!(null)).is_none());
        assert!(RecordId::from_json(&json!("")).is_none());
    }

    #[test]
    fn test_record_id_serde_rejects_empty() {
        let parsed: Result<RecordId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());

        let id: RecordId = serde_json::from_str("\"rec-7\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"rec-7\"");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }
}
