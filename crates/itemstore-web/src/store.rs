//! Web service implementation of DataStore
//!
//! Translates fetch options into query parameters, follows the service's
//! paging mechanism and maps mutations onto HTTP calls.
//!
//! ## Design Notes
//!
//! - Structured filters are sent as a Parse/Mongo-style JSON `where`
//!   document in `filter_parameter`; raw filters are sent verbatim.
//! - Offset paging asks for one record more than the page size when the
//!   service accepts a batch size, so `has_more` is exact at page boundaries.
//!   Without a batch size parameter the page is cut locally and the service
//!   counts as exhausted once it returns fewer records than the page size.
//! - An unpaged fetch against a paging service follows batches until the
//!   service returns a short or empty batch.
//! - Services without any paging return everything in one response; pages
//!   are then cut locally.

use std::collections::BTreeMap;

use itemstore_core::domain::{
    BatchCursor, Condition, ConditionOp, CursorPosition, FetchOptions, Filter, PagingScheme,
    Record, RecordId, StoreError,
};
use itemstore_core::ports::{validate_fetch, DataStore, FetchedBatch};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::client::WebClient;
use crate::definition::WebServiceDefinition;

/// Upper bound on batches followed by a single unpaged fetch
const MAX_FOLLOWED_BATCHES: usize = 1000;

/// Batch size requested while following an unpaged offset fetch
const UNPAGED_BATCH_SIZE: usize = 100;

/// Store backed by a remote JSON web service
#[derive(Debug, Clone)]
pub struct WebServiceStore {
    definition: WebServiceDefinition,
    client: WebClient,
    scheme: PagingScheme,
}

impl WebServiceStore {
    /// Validates the definition and builds the HTTP client
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidConfiguration` when the definition is
    /// unusable (bad URL, conflicting paging, invalid headers or methods).
    pub fn new(definition: WebServiceDefinition) -> Result<Self, StoreError> {
        definition.validate()?;
        let scheme = definition.paging_scheme()?;
        let client = WebClient::new(&definition)?;
        Ok(Self {
            definition,
            client,
            scheme,
        })
    }

    /// Builds a store from a JSON/YAML service description
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let definition: WebServiceDefinition = serde_json::from_value(value).map_err(|e| {
            StoreError::InvalidConfiguration(format!("invalid web service definition: {e}"))
        })?;
        Self::new(definition)
    }

    pub fn definition(&self) -> &WebServiceDefinition {
        &self.definition
    }

    // ------------------------------------------------------------------------
    // Request building
    // ------------------------------------------------------------------------

    /// Query parameters shared by every batch of a fetch
    fn base_query(&self, options: &FetchOptions) -> Result<Vec<(String, String)>, StoreError> {
        let mut query = pairs(&self.definition.fetch_parameters);

        if let Some(filter) = &options.filter {
            if let Some(param) = self.encode_filter(filter)? {
                query.push(param);
            }
        }

        let sort = options.effective_sort();
        match &self.definition.sort_parameter {
            Some(param) if !sort.is_empty() => {
                let order = sort
                    .iter()
                    .map(|d| {
                        if d.ascending {
                            d.field.clone()
                        } else {
                            format!("-{}", d.field)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                query.push((param.clone(), order));
            }
            Some(_) => {}
            None if !options.sort.is_empty() => {
                return Err(StoreError::InvalidConfiguration(
                    "web service has no sort parameter".to_string(),
                ));
            }
            // The order attribute alone is assumed to be the service's natural order
            None => {}
        }

        if !options.include.is_empty() {
            match &self.definition.include_parameter {
                Some(param) => query.push((param.clone(), options.include.join(","))),
                None => debug!(include = ?options.include, "Web service ignores include hints"),
            }
        }
        Ok(query)
    }

    fn encode_filter(&self, filter: &Filter) -> Result<Option<(String, String)>, StoreError> {
        let param = self.definition.filter_parameter.clone().ok_or_else(|| {
            StoreError::InvalidConfiguration("web service has no filter parameter".to_string())
        })?;
        match filter {
            Filter::Raw(expr) => Ok(Some((param, expr.clone()))),
            Filter::Conditions(conditions) if conditions.is_empty() => Ok(None),
            Filter::Conditions(conditions) => {
                Ok(Some((param, where_clause(conditions).to_string())))
            }
        }
    }

    fn size_param(&self, size: Option<usize>) -> Option<(String, String)> {
        match (&self.definition.batch_size_parameter, size) {
            (Some(name), Some(size)) => Some((name.clone(), size.to_string())),
            _ => None,
        }
    }

    async fn get(&self, url: Url, query: &[(String, String)]) -> Result<Value, StoreError> {
        debug!(%url, params = query.len(), "Fetching web service batch");
        let body = self.client.send_json(Method::GET, url, query, None).await?;
        Ok(body.unwrap_or(Value::Null))
    }

    // ------------------------------------------------------------------------
    // Response decoding
    // ------------------------------------------------------------------------

    fn extract_records(&self, body: &Value) -> Result<Vec<Record>, StoreError> {
        let body = match &self.definition.atomic_result_key {
            Some(key) => match lookup(body, key) {
                None | Some(Value::Null) => return Ok(Vec::new()),
                Some(Value::Array(wrapped)) if wrapped.len() == 1 => &wrapped[0],
                Some(other) => {
                    return Err(StoreError::Unexpected(format!(
                        "expected a one-element array under '{key}', got {}",
                        json_type(other)
                    )))
                }
            },
            None => body,
        };
        let results = match &self.definition.results_key {
            Some(key) => lookup(body, key).unwrap_or(&Value::Null),
            None => body,
        };
        match results {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    Record::from_json_object(item.clone(), &self.definition.object_id_key)
                        .map_err(|e| StoreError::Unexpected(format!("invalid record in response: {e}")))
                })
                .collect(),
            other => Err(StoreError::Unexpected(format!(
                "expected an array of records, got {}",
                json_type(other)
            ))),
        }
    }

    /// Next-batch token or link from a response body
    fn next_marker(&self, body: &Value) -> Option<String> {
        let key = match self.scheme {
            PagingScheme::Token => self.definition.next_batch_token_key.as_deref()?,
            PagingScheme::Link => self.definition.next_batch_url_key.as_deref()?,
            PagingScheme::Offset => return None,
        };
        lookup(body, key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn merge_response(&self, submitted: &Record, response: Option<Value>) -> Result<Record, StoreError> {
        let mut fields = submitted.to_json_object(&self.definition.object_id_key);
        match (response, &mut fields) {
            (Some(Value::Object(returned)), Value::Object(fields)) => fields.extend(returned),
            (None | Some(Value::Null), _) => {}
            (Some(other), _) => {
                debug!(kind = json_type(&other), "Ignoring non-object mutation response");
            }
        }
        let mut saved = Record::from_json_object(fields, &self.definition.object_id_key)?;
        if saved.id().is_none() {
            if let Some(id) = submitted.id() {
                saved.set_id(id.clone());
            }
        }
        Ok(saved)
    }

    fn request_body(&self, record: &Record) -> Value {
        let object = record.to_json_object(&self.definition.object_id_key);
        match object {
            Value::Object(fields) => Value::Object(self.definition.writable_fields(&fields)),
            other => other,
        }
    }

    // ------------------------------------------------------------------------
    // Paging strategies
    // ------------------------------------------------------------------------

    /// Start-index paging
    async fn fetch_offset(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
        base_query: Vec<(String, String)>,
    ) -> Result<FetchedBatch, StoreError> {
        let start = cursor.resolve_offset(options)?;
        let url = self.definition.fetch_url()?;

        let Some(limit) = options.page_size.limit() else {
            return self.fetch_offset_all(url, start, base_query).await;
        };

        // One extra record tells whether another page exists
        let requested = limit.saturating_add(1);
        let query = self.offset_query(&base_query, start, Some(requested));
        let mut records = self.extract_records(&self.get(url, &query).await?)?;
        let has_more = if self.definition.batch_size_parameter.is_some() {
            records.len() > limit
        } else {
            records.len() >= limit
        };
        records.truncate(limit);

        let next = start + records.len();
        debug!(start, returned = records.len(), has_more, "Fetched offset batch");
        Ok(FetchedBatch::new(records, BatchCursor::offset(next, has_more)))
    }

    /// Follows start-index batches until a short or empty one
    async fn fetch_offset_all(
        &self,
        url: Url,
        start: usize,
        base_query: Vec<(String, String)>,
    ) -> Result<FetchedBatch, StoreError> {
        let sized = self.definition.batch_size_parameter.is_some();
        let mut records = Vec::new();
        // Without a size parameter the first batch reveals the service's own size
        let mut batch_size = sized.then_some(UNPAGED_BATCH_SIZE);

        for _ in 0..MAX_FOLLOWED_BATCHES {
            let query = self.offset_query(&base_query, start + records.len(), batch_size);
            let batch = self.extract_records(&self.get(url.clone(), &query).await?)?;
            let returned = batch.len();
            records.extend(batch);

            let expected = *batch_size.get_or_insert(returned);
            if returned == 0 || returned < expected {
                let next = start + records.len();
                debug!(start, returned = records.len(), "Fetched all offset batches");
                return Ok(FetchedBatch::new(records, BatchCursor::offset(next, false)));
            }
        }
        warn!(fetched = records.len(), "Stopped following batches at the batch limit");
        let next = start + records.len();
        Ok(FetchedBatch::new(records, BatchCursor::offset(next, true)))
    }

    fn offset_query(
        &self,
        base_query: &[(String, String)],
        offset: usize,
        size: Option<usize>,
    ) -> Vec<(String, String)> {
        let mut query = base_query.to_vec();
        if let Some(param) = &self.definition.batch_start_index_parameter {
            let index = self.definition.batch_initial_start_index + offset;
            query.push((param.clone(), index.to_string()));
        }
        query.extend(self.size_param(size));
        query
    }

    /// Service returns everything at once; pages are cut locally
    async fn fetch_unpaged(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
        base_query: Vec<(String, String)>,
    ) -> Result<FetchedBatch, StoreError> {
        let start = cursor.resolve_offset(options)?;
        let body = self.get(self.definition.fetch_url()?, &base_query).await?;
        let all = self.extract_records(&body)?;
        let total = all.len();

        let records: Vec<Record> = match options.page_size.limit() {
            Some(limit) => all.into_iter().skip(start).take(limit).collect(),
            None => all.into_iter().skip(start).collect(),
        };
        let next = (start + records.len()).min(total);
        let has_more = !options.page_size.is_unpaged() && next < total;
        Ok(FetchedBatch::new(records, BatchCursor::offset(next, has_more)))
    }

    /// Token or link paging
    async fn fetch_chained(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
        base_query: Vec<(String, String)>,
    ) -> Result<FetchedBatch, StoreError> {
        let limit = options.page_size.limit();
        let mut position = cursor.position().clone();
        let mut records = Vec::new();

        for _ in 0..MAX_FOLLOWED_BATCHES {
            let (url, query) = match &position {
                CursorPosition::Start => {
                    let mut query = base_query.clone();
                    query.extend(self.size_param(limit));
                    (self.definition.fetch_url()?, query)
                }
                CursorPosition::Token(token) => {
                    let mut query = base_query.clone();
                    query.extend(self.size_param(limit));
                    let param = self.definition.batch_token_parameter.clone().unwrap_or_default();
                    query.push((param, token.clone()));
                    (self.definition.fetch_url()?, query)
                }
                CursorPosition::Link(link) => (self.resolve_link(link)?, Vec::new()),
                CursorPosition::Offset(_) | CursorPosition::End => {
                    return Err(StoreError::InvalidConfiguration(format!(
                        "cursor position is not valid for a {}-paged store",
                        self.scheme
                    )));
                }
            };

            let body = self.get(url, &query).await?;
            let batch = self.extract_records(&body)?;
            if let Some(limit) = limit {
                if batch.len() > limit {
                    warn!(
                        limit,
                        returned = batch.len(),
                        "Web service returned more records than the page size"
                    );
                }
            }
            records.extend(batch);

            let next = self.next_marker(&body);
            match (limit, next) {
                (None, Some(next)) => {
                    position = match self.scheme {
                        PagingScheme::Link => CursorPosition::Link(next),
                        _ => CursorPosition::Token(next),
                    };
                }
                (_, next) => return self.chained_batch(records, next),
            }
        }

        warn!(fetched = records.len(), "Stopped following batches at the batch limit");
        let next = match position {
            CursorPosition::Token(t) | CursorPosition::Link(t) => Some(t),
            _ => None,
        };
        self.chained_batch(records, next)
    }

    fn chained_batch(&self, records: Vec<Record>, next: Option<String>) -> Result<FetchedBatch, StoreError> {
        let has_more = next.is_some();
        let cursor = match self.scheme {
            PagingScheme::Link => BatchCursor::link(next, has_more)?,
            _ => BatchCursor::token(next, has_more)?,
        };
        debug!(returned = records.len(), has_more, scheme = %self.scheme, "Fetched chained batch");
        Ok(FetchedBatch::new(records, cursor))
    }

    fn resolve_link(&self, link: &str) -> Result<Url, StoreError> {
        Url::parse(link)
            .or_else(|_| self.definition.fetch_url()?.join(link).map_err(|e| {
                StoreError::Unexpected(format!("invalid next-batch link '{link}': {e}"))
            }))
    }

    fn require_id<'a>(&self, record: &'a Record) -> Result<&'a RecordId, StoreError> {
        record
            .id()
            .ok_or_else(|| StoreError::ValidationRejected("record has no identifier".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn pairs(params: &BTreeMap<String, String>) -> Vec<(String, String)> {
    params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Follows a dotted key path through nested objects
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Literal regex for a value, in PCRE `\Q..\E` quoting
fn quote_regex(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("\\Q{}\\E", text.replace("\\E", "\\E\\\\E\\Q"))
}

/// Parse/Mongo-style query document for a conjunction of conditions
fn where_clause(conditions: &[Condition]) -> Value {
    let mut clause = Map::new();
    for condition in conditions {
        let (op, operand) = match condition.op {
            ConditionOp::Eq => {
                clause.insert(condition.field.clone(), condition.value.clone());
                continue;
            }
            ConditionOp::Ne => ("$ne", condition.value.clone()),
            ConditionOp::Lt => ("$lt", condition.value.clone()),
            ConditionOp::Le => ("$lte", condition.value.clone()),
            ConditionOp::Gt => ("$gt", condition.value.clone()),
            ConditionOp::Ge => ("$gte", condition.value.clone()),
            ConditionOp::Contains => match &condition.value {
                Value::String(_) => ("$regex", json!(quote_regex(&condition.value))),
                other => ("$all", json!([other])),
            },
            ConditionOp::Prefix => ("$regex", json!(format!("^{}", quote_regex(&condition.value)))),
        };
        let entry = clause
            .entry(condition.field.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(ops) => {
                ops.insert(op.to_string(), operand);
            }
            other => {
                let mut ops = Map::new();
                ops.insert(op.to_string(), operand);
                *other = Value::Object(ops);
            }
        }
    }
    Value::Object(clause)
}

// ============================================================================
// DataStore implementation
// ============================================================================

#[async_trait::async_trait]
impl DataStore for WebServiceStore {
    fn paging_scheme(&self) -> PagingScheme {
        self.scheme
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
    ) -> Result<FetchedBatch, StoreError> {
        validate_fetch(options, cursor, self.scheme)?;
        if !cursor.has_more() {
            return Ok(FetchedBatch::exhausted());
        }
        let base_query = self.base_query(options)?;
        match self.scheme {
            PagingScheme::Offset if self.definition.is_paged() => {
                self.fetch_offset(options, cursor, base_query).await
            }
            PagingScheme::Offset => self.fetch_unpaged(options, cursor, base_query).await,
            PagingScheme::Token | PagingScheme::Link => {
                self.fetch_chained(options, cursor, base_query).await
            }
        }
    }

    async fn insert(&self, record: &Record) -> Result<Record, StoreError> {
        let url = self.definition.insert_url()?;
        let method = self.definition.insert_method()?;
        let body = self.request_body(record);

        debug!(%url, %method, "Inserting record");
        let query = pairs(&self.definition.insert_parameters);
        let response = self.client.send_json(method, url, &query, Some(&body)).await?;
        self.merge_response(record, response)
    }

    async fn update(&self, record: &Record) -> Result<Record, StoreError> {
        let id = self.require_id(record)?;
        let url = self.definition.update_url(id)?;
        let method = self.definition.update_method()?;
        let body = self.request_body(record);

        debug!(%url, %method, id = %id, "Updating record");
        let query = pairs(&self.definition.update_parameters);
        let response = self.client.send_json(method, url, &query, Some(&body)).await?;
        self.merge_response(record, response)
    }

    async fn delete(&self, record: &Record) -> Result<(), StoreError> {
        let id = self.require_id(record)?;
        let url = self.definition.delete_url(id)?;

        debug!(%url, id = %id, "Deleting record");
        let query = pairs(&self.definition.delete_parameters);
        self.client.send_json(Method::DELETE, url, &query, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_clause_operators() {
        let clause = where_clause(&[
            Condition::eq("status", "open"),
            Condition::new("priority", ConditionOp::Gt, 1),
            Condition::new("priority", ConditionOp::Le, 5),
            Condition::new("tags", ConditionOp::Contains, 3),
        ]);
        assert_eq!(
            clause,
            json!({
                "status": "open",
                "priority": { "$gt": 1, "$lte": 5 },
                "tags": { "$all": [3] }
            })
        );
    }

    #[test]
    fn test_where_clause_regex_quoting() {
        let clause = where_clause(&[Condition::new("title", ConditionOp::Prefix, "a.b")]);
        assert_eq!(clause, json!({ "title": { "$regex": "^\\Qa.b\\E" } }));
    }

    #[test]
    fn test_lookup_dotted_path() {
        let body = json!({ "data": { "items": [1, 2] }, "links": { "next": "/p2" } });
        assert_eq!(lookup(&body, "data.items"), Some(&json!([1, 2])));
        assert_eq!(lookup(&body, "links.next"), Some(&json!("/p2")));
        assert_eq!(lookup(&body, "links.prev"), None);
    }

    #[test]
    fn test_merge_response_keeps_submitted_fields() {
        let store = WebServiceStore::new(
            WebServiceDefinition::parse_class("http://localhost:1337/parse", "Task", "a", "k"),
        )
        .unwrap();
        let submitted = Record::new().with_field("title", "write");
        let saved = store
            .merge_response(
                &submitted,
                Some(json!({ "objectId": "xyz", "createdAt": "2026-01-01T00:00:00Z" })),
            )
            .unwrap();
        assert_eq!(saved.id().map(|id| id.as_str()), Some("xyz"));
        assert_eq!(saved.get("title"), Some(&json!("write")));
        assert!(saved.get("createdAt").is_some());
    }

    #[test]
    fn test_filter_without_parameter_rejected() {
        let store =
            WebServiceStore::new(WebServiceDefinition::new("http://localhost", "items")).unwrap();
        let options =
            FetchOptions::new().with_filter(Filter::Conditions(vec![Condition::eq("a", 1)]));
        assert!(matches!(
            store.base_query(&options),
            Err(StoreError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_conflicting_definition_rejected() {
        let definition = WebServiceDefinition::new("http://localhost", "items")
            .with_link_paging("next")
            .with_token_paging("token", "pageToken");
        assert!(matches!(
            WebServiceStore::new(definition),
            Err(StoreError::InvalidConfiguration(_))
        ));
    }
}
