//! No-connection policies
//!
//! When a mutation fails with `ConnectionUnavailable`, the integrator decides
//! per operation kind whether the controller queues it for a later retry or
//! reports it as a terminal failure.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Kind of mutation mediated by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// What to do with a mutation that failed for lack of connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoConnectionPolicy {
    /// Queue the operation and replay it when connectivity returns
    RetryLater,
    /// Report the failure immediately
    #[default]
    Fail,
}

/// Static policy per operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPolicies {
    pub insert: NoConnectionPolicy,
    pub update: NoConnectionPolicy,
    pub delete: NoConnectionPolicy,
}

impl ConnectionPolicies {
    /// Same policy for every operation kind
    #[must_use]
    pub fn uniform(policy: NoConnectionPolicy) -> Self {
        Self {
            insert: policy,
            update: policy,
            delete: policy,
        }
    }

    #[must_use]
    pub fn for_kind(&self, kind: OperationKind) -> NoConnectionPolicy {
        match kind {
            OperationKind::Insert => self.insert,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fail() {
        let policies = ConnectionPolicies::default();
        assert_eq!(policies.for_kind(OperationKind::Insert), NoConnectionPolicy::Fail);
        assert_eq!(policies.for_kind(OperationKind::Delete), NoConnectionPolicy::Fail);
    }

    #[test]
    fn test_per_kind_lookup() {
        let policies = ConnectionPolicies {
            update: NoConnectionPolicy::RetryLater,
            ..ConnectionPolicies::default()
        };
        assert_eq!(
            policies.for_kind(OperationKind::Update),
            NoConnectionPolicy::RetryLater
        );
        assert_eq!(policies.for_kind(OperationKind::Insert), NoConnectionPolicy::Fail);
    }

    #[test]
    fn test_deserializes_snake_case() {
        let policies: ConnectionPolicies =
            serde_yaml::from_str("insert: retry_later\ndelete: fail\n").unwrap();
        assert_eq!(policies.insert, NoConnectionPolicy::RetryLater);
        assert_eq!(policies.update, NoConnectionPolicy::Fail);
    }
}
