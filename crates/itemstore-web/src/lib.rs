//! Itemstore Web - HTTP/JSON web service store
//!
//! Provides a `DataStore` backed by a remote REST service:
//! - Declarative service description ([`WebServiceDefinition`])
//! - Offset, token and link paging driven by the description
//! - Insert/update/delete mapped to HTTP methods
//! - HTTP 429 backoff honouring `Retry-After`
//!
//! ## Modules
//!
//! - [`definition`] - Service description and the Parse-style preset
//! - [`client`] - reqwest client with headers, authorization and retries
//! - [`store`] - `DataStore` implementation

pub mod client;
pub mod definition;
pub mod store;

pub use client::WebClient;
pub use definition::{Authorization, WebServiceDefinition};
pub use store::WebServiceStore;

use itemstore_core::domain::StoreError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to a web service
#[derive(Debug, Error)]
pub enum WebError {
    /// The request never produced a response (connect, timeout, transport)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status
        status: StatusCode,
        /// Response body, possibly truncated
        body: String,
    },

    /// Still throttled after every retry
    #[error("Too many requests, gave up after {attempts} attempts")]
    TooManyRequests {
        /// Number of requests sent
        attempts: u32,
    },

    /// The response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The service definition cannot be used to build a request
    #[error("Invalid service definition: {0}")]
    InvalidDefinition(String),
}

impl From<WebError> for StoreError {
    fn from(err: WebError) -> Self {
        match err {
            WebError::Network(e) if e.is_builder() => {
                StoreError::InvalidConfiguration(e.to_string())
            }
            WebError::Network(e) if e.is_decode() => StoreError::Unexpected(e.to_string()),
            WebError::Network(e) => StoreError::ConnectionUnavailable(e.to_string()),
            WebError::Status { status, body } => {
                let message = format!("HTTP {status}: {body}");
                match status.as_u16() {
                    502..=504 => StoreError::ConnectionUnavailable(message),
                    400 | 401 | 403 | 409 | 422 => StoreError::ValidationRejected(message),
                    404 => StoreError::NotFound(message),
                    _ => StoreError::Unexpected(message),
                }
            }
            err @ WebError::TooManyRequests { .. } => {
                StoreError::ConnectionUnavailable(err.to_string())
            }
            WebError::InvalidResponse(message) => StoreError::Unexpected(message),
            WebError::InvalidDefinition(message) => StoreError::InvalidConfiguration(message),
        }
    }
}
