//! Insert, update and delete against mocked services

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itemstore_core::domain::{Record, StoreError};
use itemstore_core::ports::DataStore;
use itemstore_web::{Authorization, WebServiceDefinition, WebServiceStore};

use crate::common;

#[tokio::test]
async fn test_insert_returns_server_assigned_id() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("POST"))
        .and(path("/parse/classes/Task"))
        .and(header("X-Parse-REST-API-Key", "test-rest-key"))
        .and(body_json(json!({ "title": "write tests" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "objectId": "n1",
            "createdAt": "2026-03-01T12:00:00.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let saved = store
        .insert(&Record::new().with_field("title", "write tests"))
        .await
        .expect("insert");
    assert_eq!(saved.id().unwrap().as_str(), "n1");
    assert_eq!(saved.get("title"), Some(&json!("write tests")));
    assert_eq!(saved.get("createdAt"), Some(&json!("2026-03-01T12:00:00.000Z")));
}

#[tokio::test]
async fn test_update_strips_read_only_keys() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("PUT"))
        .and(path("/parse/classes/Task/abc"))
        .and(body_json(json!({ "title": "renamed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updatedAt": "2026-03-02T08:00:00.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut record =
        Record::from_json_object(common::parse_task("abc", "original"), "objectId").unwrap();
    record.set("title", "renamed");

    let saved = store.update(&record).await.expect("update");
    assert_eq!(saved.id().unwrap().as_str(), "abc");
    assert_eq!(saved.get("title"), Some(&json!("renamed")));
    assert_eq!(saved.get("updatedAt"), Some(&json!("2026-03-02T08:00:00.000Z")));
}

#[tokio::test]
async fn test_delete_uses_object_url() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/parse/classes/Task/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let record = Record::from_json_object(common::parse_task("abc", "gone"), "objectId").unwrap();
    store.delete(&record).await.expect("delete");
}

#[tokio::test]
async fn test_templated_api_custom_method_and_basic_auth() {
    let server = MockServer::start().await;
    let mut definition = WebServiceDefinition::new(server.uri(), "api/items")
        .with_update_api("api/items/{id}/fields")
        .with_authorization(Authorization::Basic {
            username: "user".into(),
            password: Some("pass".into()),
        });
    definition.update_method = "PATCH".into();
    let store = WebServiceStore::new(definition).unwrap();

    Mock::given(method("PATCH"))
        .and(path("/api/items/7/fields"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .and(body_json(json!({ "id": 7, "done": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let record = Record::from_json_object(json!({ "id": 7, "done": false }), "id")
        .unwrap()
        .with_field("done", true);
    let saved = store.update(&record).await.expect("patch");
    assert_eq!(saved.get("done"), Some(&json!(true)));
    assert_eq!(saved.id().unwrap().as_str(), "7");
}

#[tokio::test]
async fn test_rejected_insert_is_validation_error() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "code": 142,
            "error": "title is required"
        })))
        .mount(&server)
        .await;

    let err = store.insert(&Record::new()).await.unwrap_err();
    assert!(matches!(err, StoreError::ValidationRejected(ref m) if m.contains("title is required")));
}

#[tokio::test]
async fn test_delete_missing_object_is_not_found() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 101,
            "error": "Object not found."
        })))
        .mount(&server)
        .await;

    let record = Record::from_json_object(common::parse_task("zzz", "ghost"), "objectId").unwrap();
    let err = store.delete(&record).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_update_without_id_sends_nothing() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = store
        .update(&Record::new().with_field("title", "orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ValidationRejected(_)));
}

#[tokio::test]
async fn test_mutation_parameters_are_sent_per_operation() {
    let server = MockServer::start().await;
    let definition = WebServiceDefinition::new(server.uri(), "items")
        .with_insert_parameter("notify", "true")
        .with_update_parameter("merge", "1")
        .with_delete_parameter("hard", "1");
    let store = WebServiceStore::new(definition).unwrap();

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(query_param("notify", "true"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "n" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/items/n"))
        .and(query_param("merge", "1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/items/n"))
        .and(query_param("hard", "1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let saved = store
        .insert(&Record::new().with_field("title", "x"))
        .await
        .expect("insert");
    store.update(&saved).await.expect("update");
    store.delete(&saved).await.expect("delete");
}
