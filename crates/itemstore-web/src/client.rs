//! HTTP client for web service stores
//!
//! Wraps `reqwest::Client` with the definition's default headers,
//! authorization and request timeout, and retries throttled requests.
//!
//! ## 429 handling
//!
//! A `429 Too Many Requests` response is retried after the delay given by
//! its `Retry-After` header (seconds or HTTP-date), up to `max_retries`
//! times. After that the request fails with [`WebError::TooManyRequests`],
//! which stores report as a connectivity failure.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::definition::{Authorization, WebServiceDefinition};
use crate::WebError;

/// Delay used when a 429 response carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Upper bound on a single backoff
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest error body kept in [`WebError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// HTTP client configured from a [`WebServiceDefinition`]
#[derive(Debug, Clone)]
pub struct WebClient {
    client: Client,
    authorization: Option<Authorization>,
    max_retries: u32,
}

impl WebClient {
    /// Builds a client with the definition's headers, authorization and timeout
    ///
    /// # Errors
    ///
    /// Returns `WebError::InvalidDefinition` for header names or values that
    /// are not valid HTTP.
    pub fn new(definition: &WebServiceDefinition) -> Result<Self, WebError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &definition.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                WebError::InvalidDefinition(format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                WebError::InvalidDefinition(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(header_name, header_value);
        }
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(definition.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            authorization: definition.authorization.clone(),
            max_retries: definition.max_retries,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Creates an authorized request builder for `url`
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.authorization {
            Some(Authorization::Basic { username, password }) => {
                request.basic_auth(username, password.as_deref())
            }
            Some(Authorization::Bearer { token }) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and decodes the JSON response
    ///
    /// Returns `Ok(None)` for an empty success body.
    pub async fn send_json(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, WebError> {
        let response = self
            .execute_with_retry(method.clone(), url.clone(), query, body)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(%method, %url, %status, "Web service returned error status");
            return Err(WebError::Status {
                status,
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| WebError::InvalidResponse(format!("response from {url} is not JSON: {e}")))
    }

    /// Executes a request, sleeping and retrying on HTTP 429
    async fn execute_with_retry(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response, WebError> {
        for attempt in 0..=self.max_retries {
            let mut request = self.request(method.clone(), url.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.max_retries {
                    warn!(%url, attempts = attempt + 1, "429 retry limit exhausted");
                    return Err(WebError::TooManyRequests {
                        attempts: attempt + 1,
                    });
                }

                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                    .unwrap_or(DEFAULT_RETRY_AFTER);

                info!(
                    %url,
                    attempt,
                    retry_after_ms = retry_after.as_millis(),
                    "Received 429, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if attempt > 0 {
                info!(%url, attempt, "Request succeeded after retry");
            }
            return Ok(response);
        }

        Err(WebError::TooManyRequests {
            attempts: self.max_retries + 1,
        })
    }
}

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds or an HTTP-date. Unparseable values and dates in
/// the past yield `default`; every result is capped at one minute.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Ok(wait) = (target - now).to_std() {
                return wait.min(MAX_RETRY_AFTER);
            }
        }
        return default;
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
