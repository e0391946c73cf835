//! Declarative description of a JSON web service
//!
//! A [`WebServiceDefinition`] says where records are fetched from, how the
//! service pages them and which endpoints accept mutations. It deserializes
//! from the `backend.service` section of the configuration file.
//!
//! ## Paging
//!
//! At most one paging mechanism may be configured:
//!
//! | Field                          | Scheme  |
//! |--------------------------------|---------|
//! | `batch_start_index_parameter`  | Offset  |
//! | `next_batch_url_key`           | Link    |
//! | `next_batch_token_key`         | Token   |
//! | none                           | Offset (the service returns everything) |

use std::collections::BTreeMap;
use std::fmt;

use itemstore_core::domain::{PagingScheme, RecordId, StoreError};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Credentials sent with every request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Authorization {
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Description of a remote record collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServiceDefinition {
    pub base_url: String,
    /// Path of the collection, relative to `base_url`
    pub fetch_api: String,
    /// Extra query parameters sent with every fetch
    pub fetch_parameters: BTreeMap<String, String>,
    /// Dotted path to the results array; the body itself is the array when unset
    pub results_key: Option<String>,
    /// Key holding a one-element array that wraps the result object;
    /// `results_key` is then resolved inside that object
    pub atomic_result_key: Option<String>,
    pub object_id_key: String,
    /// Keys never sent on update
    pub read_only_keys: Vec<String>,

    pub batch_size_parameter: Option<String>,
    pub batch_start_index_parameter: Option<String>,
    /// Index of the first record as the service counts them
    pub batch_initial_start_index: usize,
    pub next_batch_url_key: Option<String>,
    pub next_batch_token_key: Option<String>,
    pub batch_token_parameter: Option<String>,

    pub filter_parameter: Option<String>,
    pub sort_parameter: Option<String>,
    pub include_parameter: Option<String>,

    /// Defaults to `fetch_api`
    pub insert_api: Option<String>,
    pub insert_method: String,
    /// Extra query parameters sent with every insert
    pub insert_parameters: BTreeMap<String, String>,
    /// May contain an `{id}` placeholder; otherwise the id is appended as a
    /// path segment to this path (or to `fetch_api`)
    pub update_api: Option<String>,
    pub update_method: String,
    pub update_parameters: BTreeMap<String, String>,
    pub delete_api: Option<String>,
    pub delete_parameters: BTreeMap<String, String>,

    pub headers: BTreeMap<String, String>,
    pub authorization: Option<Authorization>,
    pub timeout_secs: u64,
    /// Retries after HTTP 429 before the request counts as unavailable
    pub max_retries: u32,
}

impl Default for WebServiceDefinition {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            fetch_api: String::new(),
            fetch_parameters: BTreeMap::new(),
            results_key: None,
            atomic_result_key: None,
            object_id_key: "id".to_string(),
            read_only_keys: Vec::new(),
            batch_size_parameter: None,
            batch_start_index_parameter: None,
            batch_initial_start_index: 0,
            next_batch_url_key: None,
            next_batch_token_key: None,
            batch_token_parameter: None,
            filter_parameter: None,
            sort_parameter: None,
            include_parameter: None,
            insert_api: None,
            insert_method: "POST".to_string(),
            insert_parameters: BTreeMap::new(),
            update_api: None,
            update_method: "PUT".to_string(),
            update_parameters: BTreeMap::new(),
            delete_api: None,
            delete_parameters: BTreeMap::new(),
            headers: BTreeMap::new(),
            authorization: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl WebServiceDefinition {
    pub fn new(base_url: impl Into<String>, fetch_api: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            fetch_api: fetch_api.into(),
            ..Self::default()
        }
    }

    /// Preset for a Parse-style document service
    ///
    /// Objects of `class_name` live under `/classes/{class_name}`, are keyed
    /// by `objectId` and paged with `skip`/`limit`. Filters go into the
    /// `where` parameter and sorting into `order`.
    pub fn parse_class(
        server_url: impl Into<String>,
        class_name: &str,
        application_id: impl Into<String>,
        rest_api_key: impl Into<String>,
    ) -> Self {
        let mut definition = Self::new(server_url, format!("classes/{class_name}"));
        definition.results_key = Some("results".to_string());
        definition.object_id_key = "objectId".to_string();
        definition.read_only_keys = vec![
            "objectId".to_string(),
            "createdAt".to_string(),
            "updatedAt".to_string(),
        ];
        definition.batch_size_parameter = Some("limit".to_string());
        definition.batch_start_index_parameter = Some("skip".to_string());
        definition.filter_parameter = Some("where".to_string());
        definition.sort_parameter = Some("order".to_string());
        definition.include_parameter = Some("include".to_string());
        definition
            .headers
            .insert("X-Parse-Application-Id".to_string(), application_id.into());
        definition
            .headers
            .insert("X-Parse-REST-API-Key".to_string(), rest_api_key.into());
        definition
    }

    pub fn with_results_key(mut self, key: impl Into<String>) -> Self {
        self.results_key = Some(key.into());
        self
    }

    pub fn with_atomic_result_key(mut self, key: impl Into<String>) -> Self {
        self.atomic_result_key = Some(key.into());
        self
    }

    pub fn with_object_id_key(mut self, key: impl Into<String>) -> Self {
        self.object_id_key = key.into();
        self
    }

    pub fn with_read_only_key(mut self, key: impl Into<String>) -> Self {
        self.read_only_keys.push(key.into());
        self
    }

    pub fn with_fetch_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fetch_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_batch_size_parameter(mut self, name: impl Into<String>) -> Self {
        self.batch_size_parameter = Some(name.into());
        self
    }

    pub fn with_offset_paging(mut self, start_index_parameter: impl Into<String>, initial: usize) -> Self {
        self.batch_start_index_parameter = Some(start_index_parameter.into());
        self.batch_initial_start_index = initial;
        self
    }

    pub fn with_link_paging(mut self, next_url_key: impl Into<String>) -> Self {
        self.next_batch_url_key = Some(next_url_key.into());
        self
    }

    pub fn with_token_paging(
        mut self,
        next_token_key: impl Into<String>,
        token_parameter: impl Into<String>,
    ) -> Self {
        self.next_batch_token_key = Some(next_token_key.into());
        self.batch_token_parameter = Some(token_parameter.into());
        self
    }

    pub fn with_filter_parameter(mut self, name: impl Into<String>) -> Self {
        self.filter_parameter = Some(name.into());
        self
    }

    pub fn with_sort_parameter(mut self, name: impl Into<String>) -> Self {
        self.sort_parameter = Some(name.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = Some(authorization);
        self
    }

    pub fn with_update_api(mut self, api: impl Into<String>) -> Self {
        self.update_api = Some(api.into());
        self
    }

    pub fn with_delete_api(mut self, api: impl Into<String>) -> Self {
        self.delete_api = Some(api.into());
        self
    }

    pub fn with_insert_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_update_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.update_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_delete_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.delete_parameters.insert(name.into(), value.into());
        self
    }

    /// Paging scheme implied by the configured parameters
    pub fn paging_scheme(&self) -> Result<PagingScheme, StoreError> {
        let configured = [
            self.batch_start_index_parameter.is_some(),
            self.next_batch_url_key.is_some(),
            self.next_batch_token_key.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if configured > 1 {
            return Err(StoreError::InvalidConfiguration(
                "web service configures more than one paging mechanism".to_string(),
            ));
        }

        if self.next_batch_token_key.is_some() {
            if self.batch_token_parameter.is_none() {
                return Err(StoreError::InvalidConfiguration(
                    "next_batch_token_key requires batch_token_parameter".to_string(),
                ));
            }
            return Ok(PagingScheme::Token);
        }
        if self.next_batch_url_key.is_some() {
            return Ok(PagingScheme::Link);
        }
        Ok(PagingScheme::Offset)
    }

    /// Whether the service pages at all
    pub fn is_paged(&self) -> bool {
        self.batch_start_index_parameter.is_some()
            || self.next_batch_url_key.is_some()
            || self.next_batch_token_key.is_some()
    }

    /// Full check run before a store is built
    pub fn validate(&self) -> Result<(), StoreError> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            StoreError::InvalidConfiguration(format!("invalid base_url '{}': {e}", self.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(StoreError::InvalidConfiguration(format!(
                "base_url must be http or https, got '{}'",
                base.scheme()
            )));
        }
        if self.object_id_key.trim().is_empty() {
            return Err(StoreError::InvalidConfiguration(
                "object_id_key must not be empty".to_string(),
            ));
        }
        self.insert_method()?;
        self.update_method()?;
        self.paging_scheme()?;
        Ok(())
    }

    pub fn insert_method(&self) -> Result<Method, StoreError> {
        parse_method(&self.insert_method)
    }

    pub fn update_method(&self) -> Result<Method, StoreError> {
        parse_method(&self.update_method)
    }

    /// Absolute URL for a path relative to `base_url`
    pub fn endpoint(&self, api: &str) -> Result<Url, StoreError> {
        let url = match api.trim_start_matches('/') {
            "" => self.base_url.clone(),
            path => format!("{}/{}", self.base_url.trim_end_matches('/'), path),
        };
        Url::parse(&url)
            .map_err(|e| StoreError::InvalidConfiguration(format!("invalid endpoint '{url}': {e}")))
    }

    pub fn fetch_url(&self) -> Result<Url, StoreError> {
        self.endpoint(&self.fetch_api)
    }

    pub fn insert_url(&self) -> Result<Url, StoreError> {
        self.endpoint(self.insert_api.as_deref().unwrap_or(&self.fetch_api))
    }

    pub fn update_url(&self, id: &RecordId) -> Result<Url, StoreError> {
        self.object_url(self.update_api.as_deref(), id)
    }

    pub fn delete_url(&self, id: &RecordId) -> Result<Url, StoreError> {
        self.object_url(self.delete_api.as_deref(), id)
    }

    fn object_url(&self, api: Option<&str>, id: &RecordId) -> Result<Url, StoreError> {
        let api = api.unwrap_or(&self.fetch_api);
        if api.contains("{id}") {
            let segment = encode_segment(id.as_str())?;
            return self.endpoint(&api.replace("{id}", &segment));
        }
        let mut url = self.endpoint(api)?;
        let display = url.to_string();
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::InvalidConfiguration(format!("'{display}' cannot take path segments"))
            })?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }

    /// Copy of `fields` without the read-only keys
    pub fn writable_fields(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        fields
            .iter()
            .filter(|(key, _)| !self.read_only_keys.iter().any(|ro| ro == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn parse_method(method: &str) -> Result<Method, StoreError> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| StoreError::InvalidConfiguration(format!("invalid HTTP method '{method}'")))
}

/// Percent-encode a single path segment
fn encode_segment(value: &str) -> Result<String, StoreError> {
    let mut scratch = Url::parse("http://localhost/")
        .map_err(|e| StoreError::Unexpected(e.to_string()))?;
    scratch
        .path_segments_mut()
        .map_err(|()| StoreError::Unexpected("scratch URL cannot be a base".to_string()))?
        .pop_if_empty()
        .push(value);
    Ok(scratch.path().trim_start_matches('/').to_string())
}
