//! Shared test helpers for web store integration tests
//!
//! Each helper returns a store pointing at a fresh wiremock server.

use serde_json::{json, Value};
use wiremock::MockServer;

use itemstore_core::domain::Record;
use itemstore_web::{WebServiceDefinition, WebServiceStore};

/// Parse-style definition for the `Task` class on `server`
pub fn parse_definition(server: &MockServer) -> WebServiceDefinition {
    let mut definition = WebServiceDefinition::parse_class(
        format!("{}/parse", server.uri()),
        "Task",
        "test-app-id",
        "test-rest-key",
    );
    definition.timeout_secs = 5;
    definition
}

/// Starts a mock server and a Parse-style store pointing at it
pub async fn setup_parse_mock() -> (MockServer, WebServiceStore) {
    let server = MockServer::start().await;
    let store = WebServiceStore::new(parse_definition(&server)).expect("valid definition");
    (server, store)
}

/// A Parse object as the server returns it
pub fn parse_task(id: &str, title: &str) -> Value {
    json!({
        "objectId": id,
        "title": title,
        "createdAt": "2026-01-15T10:00:00.000Z",
        "updatedAt": "2026-01-15T10:00:00.000Z"
    })
}

pub fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string())
        .collect()
}
