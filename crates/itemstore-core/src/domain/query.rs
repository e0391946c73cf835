//! In-memory filter and sort evaluation
//!
//! Used by the array and key-value stores, and by the controller to place
//! inserted records by their order attribute. JSON values order as
//! null < bool < number < string < array < object; numbers compare by
//! numeric value, so `1` and `1.0` are equal.

use std::cmp::Ordering;

use serde_json::Value;

use super::errors::StoreError;
use super::fetch_options::{Condition, ConditionOp, Filter, SortDescriptor};
use super::record::Record;

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn field_or_null<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

/// Compare two records by a list of sort descriptors; missing fields are null
#[must_use]
pub fn compare_records(a: &Record, b: &Record, sort: &[SortDescriptor]) -> Ordering {
    for descriptor in sort {
        let ord = compare_values(
            field_or_null(a, &descriptor.field),
            field_or_null(b, &descriptor.field),
        );
        let ord = if descriptor.ascending {
            ord
        } else {
            ord.reverse()
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable multi-key sort; ties keep their current order
pub fn sort_records(records: &mut [Record], sort: &[SortDescriptor]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| compare_records(a, b, sort));
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

impl Condition {
    /// Evaluate the condition against a record
    ///
    /// Ordering operators only match values of the same JSON type, so a
    /// missing field never satisfies `lt`.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let actual = field_or_null(record, &self.field);
        let expected = &self.value;
        let ordered = |accept: fn(Ordering) -> bool| {
            type_rank(actual) == type_rank(expected) && accept(compare_values(actual, expected))
        };
        match self.op {
            ConditionOp::Eq => values_equal(actual, expected),
            ConditionOp::Ne => !values_equal(actual, expected),
            ConditionOp::Lt => ordered(|o| o == Ordering::Less),
            ConditionOp::Le => ordered(|o| o != Ordering::Greater),
            ConditionOp::Gt => ordered(|o| o == Ordering::Greater),
            ConditionOp::Ge => ordered(|o| o != Ordering::Less),
            ConditionOp::Contains => match (actual, expected) {
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|v| values_equal(v, needle)),
                _ => false,
            },
            ConditionOp::Prefix => match (actual, expected) {
                (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
        }
    }
}

impl Filter {
    /// Evaluate the filter in memory
    ///
    /// Raw predicates are backend-specific and cannot be evaluated here.
    pub fn matches(&self, record: &Record) -> Result<bool, StoreError> {
        match self {
            Filter::Raw(expr) => Err(StoreError::InvalidConfiguration(format!(
                "raw filter expressions are not supported by in-memory stores: {expr}"
            ))),
            Filter::Conditions(conditions) => Ok(conditions.iter().all(|c| c.matches(record))),
        }
    }

    /// Fail early on filters that cannot be evaluated in memory
    pub fn ensure_structured(&self) -> Result<(), StoreError> {
        self.matches(&Record::new()).map(|_| ())
    }
}
