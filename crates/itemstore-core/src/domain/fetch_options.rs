//! Fetch configuration
//!
//! `FetchOptions` describes one fetch: what to filter on, how to order the
//! results, how many records a batch may contain and where paging starts.
//! It is pure data. Stores interpret it; the controller only clones it.
//!
//! ## Design Notes
//!
//! - A store pages with exactly one scheme (offset, continuation token or
//!   next-page link). Seeding options for one scheme and handing them to a
//!   store of another is a configuration error, caught by
//!   [`FetchOptions::validate`].
//! - `order_attribute` is the field a list is kept sorted by. Stores append
//!   it as the final sort key; the controller uses it to position inserted
//!   and updated records.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{DomainError, StoreError};

// ============================================================================
// Sort and filter
// ============================================================================

/// Ordering on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub field: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortDescriptor {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Comparison operator of a structured filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring of a string field, or element of an array field
    Contains,
    /// String prefix
    Prefix,
}

impl ConditionOp {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOp::Eq => "eq",
            ConditionOp::Ne => "ne",
            ConditionOp::Lt => "lt",
            ConditionOp::Le => "le",
            ConditionOp::Gt => "gt",
            ConditionOp::Ge => "ge",
            ConditionOp::Contains => "contains",
            ConditionOp::Prefix => "prefix",
        }
    }
}

impl Display for ConditionOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `field op value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Eq, value)
    }
}

/// Filter predicate
///
/// `Raw` is handed to the backend untouched (an SQL fragment, a query
/// string parameter). `Conditions` are a conjunction every store can
/// evaluate or translate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Raw(String),
    Conditions(Vec<Condition>),
}

// ============================================================================
// Paging
// ============================================================================

/// Maximum number of records in one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    /// Fetch the entire result set in one call
    #[default]
    Unpaged,
    Limited(NonZeroUsize),
}

impl PageSize {
    /// `0` means unpaged
    #[must_use]
    pub fn new(size: usize) -> Self {
        NonZeroUsize::new(size).map_or(PageSize::Unpaged, PageSize::Limited)
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        match self {
            PageSize::Unpaged => None,
            PageSize::Limited(n) => Some(n.get()),
        }
    }

    #[must_use]
    pub fn is_unpaged(&self) -> bool {
        matches!(self, PageSize::Unpaged)
    }
}

/// How a store resumes a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingScheme {
    /// Row offset into the result set
    Offset,
    /// Opaque continuation token returned by the backend
    Token,
    /// Next-page URL embedded in the response
    Link,
}

impl Display for PagingScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            PagingScheme::Offset => "offset",
            PagingScheme::Token => "token",
            PagingScheme::Link => "link",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// FetchOptions
// ============================================================================

/// Configuration for one fetch call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchOptions {
    pub filter: Option<Filter>,
    pub sort: Vec<SortDescriptor>,
    pub page_size: PageSize,
    pub initial_offset: usize,
    /// Token to resume from on token-paged stores
    pub continuation_token: Option<String>,
    pub order_attribute: Option<String>,
    /// Related-entity hints for backends that can embed them
    pub include: Vec<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, descriptor: SortDescriptor) -> Self {
        self.sort.push(descriptor);
        self
    }

    /// `0` means unpaged
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = PageSize::new(size);
        self
    }

    pub fn with_initial_offset(mut self, offset: usize) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    pub fn with_order_attribute(mut self, field: impl Into<String>) -> Self {
        self.order_attribute = Some(field.into());
        self
    }

    pub fn with_include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    /// Sort descriptors followed by the order attribute, if not already listed
    #[must_use]
    pub fn effective_sort(&self) -> Vec<SortDescriptor> {
        let mut sort = self.sort.clone();
        if let Some(attr) = &self.order_attribute {
            if !sort.iter().any(|d| &d.field == attr) {
                sort.push(SortDescriptor::ascending(attr.clone()));
            }
        }
        sort
    }

    /// Check the options against the paging scheme of the store they are
    /// about to be used with
    pub fn validate(&self, scheme: PagingScheme) -> Result<(), StoreError> {
        match scheme {
            PagingScheme::Offset if self.continuation_token.is_some() => {
                return Err(StoreError::InvalidConfiguration(
                    "continuation token given to an offset-paged store".to_string(),
                ));
            }
            PagingScheme::Token | PagingScheme::Link if self.initial_offset != 0 => {
                return Err(StoreError::InvalidConfiguration(format!(
                    "initial offset given to a {scheme}-paged store"
                )));
            }
            PagingScheme::Link if self.continuation_token.is_some() => {
                return Err(StoreError::InvalidConfiguration(
                    "continuation token given to a link-paged store".to_string(),
                ));
            }
            _ => {}
        }

        for descriptor in &self.sort {
            check_field_name(&descriptor.field)?;
        }
        if let Some(attr) = &self.order_attribute {
            check_field_name(attr)?;
        }
        if let Some(Filter::Conditions(conditions)) = &self.filter {
            for condition in conditions {
                check_field_name(&condition.field)?;
            }
        }
        Ok(())
    }
}

fn check_field_name(field: &str) -> Result<(), DomainError> {
    if field.trim().is_empty() {
        return Err(DomainError::InvalidFieldName(field.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_zero_is_unpaged() {
        assert_eq!(PageSize::new(0), PageSize::Unpaged);
        assert_eq!(PageSize::new(3).limit(), Some(3));
        assert!(PageSize::default().is_unpaged());
    }

    #[test]
    fn test_builder() {
        let opts = FetchOptions::new()
            .with_page_size(10)
            .with_sort(SortDescriptor::descending("age"))
            .with_filter(Filter::Conditions(vec![Condition::eq("team", "red")]))
            .with_order_attribute("position")
            .with_include("owner");
        assert_eq!(opts.page_size.limit(), Some(10));
        assert_eq!(opts.sort.len(), 1);
        assert_eq!(opts.include, vec!["owner".to_string()]);
    }

    #[test]
    fn test_effective_sort_appends_order_attribute_once() {
        let opts = FetchOptions::new()
            .with_sort(SortDescriptor::ascending("name"))
            .with_order_attribute("position");
        let sort = opts.effective_sort();
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[1], SortDescriptor::ascending("position"));

        let opts = FetchOptions::new()
            .with_sort(SortDescriptor::descending("position"))
            .with_order_attribute("position");
        assert_eq!(opts.effective_sort().len(), 1);
    }

    #[test]
    fn test_validate_rejects_token_on_offset_store() {
        let opts = FetchOptions::new().with_continuation_token("abc");
        assert!(matches!(
            opts.validate(PagingScheme::Offset),
            Err(StoreError::InvalidConfiguration(_))
        ));
        assert!(opts.validate(PagingScheme::Token).is_ok());
    }

    #[test]
    fn test_validate_rejects_offset_on_token_store() {
        let opts = FetchOptions::new().with_initial_offset(5);
        assert!(opts.validate(PagingScheme::Offset).is_ok());
        assert!(opts.validate(PagingScheme::Token).is_err());
        assert!(opts.validate(PagingScheme::Link).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_field_names() {
        let opts = FetchOptions::new().with_sort(SortDescriptor::ascending(""));
        assert!(opts.validate(PagingScheme::Offset).is_err());
    }
}
