//! Fetch tests: paging schemes, query parameters and error mapping

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use itemstore_core::domain::{
    BatchCursor, Condition, FetchOptions, Filter, PagingScheme, SortDescriptor, StoreError,
};
use itemstore_core::ports::DataStore;
use itemstore_web::{WebServiceDefinition, WebServiceStore};

use crate::common;

#[tokio::test]
async fn test_offset_paging_with_look_ahead() {
    let (server, store) = common::setup_parse_mock().await;
    assert_eq!(store.paging_scheme(), PagingScheme::Offset);

    Mock::given(method("GET"))
        .and(path("/parse/classes/Task"))
        .and(query_param("skip", "0"))
        .and(query_param("limit", "3"))
        .and(header("X-Parse-Application-Id", "test-app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                common::parse_task("a", "one"),
                common::parse_task("b", "two"),
                common::parse_task("c", "three")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Task"))
        .and(query_param("skip", "2"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [common::parse_task("c", "three")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = FetchOptions::new().with_page_size(2);
    let first = store
        .fetch(&options, &BatchCursor::start(&options))
        .await
        .expect("first page");
    assert_eq!(common::titles(&first.records), vec!["one", "two"]);
    assert_eq!(first.records[0].id().unwrap().as_str(), "a");
    assert!(first.cursor.has_more());

    let second = store.fetch(&options, &first.cursor).await.expect("second page");
    assert_eq!(common::titles(&second.records), vec!["three"]);
    assert!(!second.cursor.has_more());
}

#[tokio::test]
async fn test_filter_and_sort_parameters() {
    let (server, store) = common::setup_parse_mock().await;

    Mock::given(method("GET"))
        .and(path("/parse/classes/Task"))
        .and(query_param("where", r#"{"status":"open"}"#))
        .and(query_param("order", "-priority,title"))
        .and(query_param("skip", "0"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [common::parse_task("a", "urgent")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = FetchOptions::new()
        .with_filter(Filter::Conditions(vec![Condition::eq("status", "open")]))
        .with_sort(SortDescriptor::descending("priority"))
        .with_order_attribute("title");
    let batch = store
        .fetch(&options, &BatchCursor::start(&options))
        .await
        .expect("filtered fetch");
    assert_eq!(common::titles(&batch.records), vec!["urgent"]);
}

#[tokio::test]
async fn test_largest_page_size_does_not_overflow() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Task"))
        .and(query_param("limit", usize::MAX.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [common::parse_task("a", "only")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = FetchOptions::new().with_page_size(usize::MAX);
    let batch = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&batch.records), vec!["only"]);
    assert!(!batch.cursor.has_more());
}

#[tokio::test]
async fn test_offset_paging_without_size_parameter_cuts_pages_locally() {
    let server = MockServer::start().await;
    let definition = WebServiceDefinition::new(server.uri(), "items").with_offset_paging("start", 0);
    let store = WebServiceStore::new(definition).unwrap();

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "title": "one"},
            {"id": 2, "title": "two"},
            {"id": 3, "title": "three"},
            {"id": 4, "title": "four"},
            {"id": 5, "title": "five"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "title": "three"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let options = FetchOptions::new().with_page_size(2);
    let first = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&first.records), vec!["one", "two"]);
    assert!(first.cursor.has_more());

    let second = store.fetch(&options, &first.cursor).await.unwrap();
    assert_eq!(common::titles(&second.records), vec!["three"]);
    assert!(!second.cursor.has_more());
}

#[tokio::test]
async fn test_unpaged_offset_fetch_stops_on_short_batch() {
    let server = MockServer::start().await;
    let definition = WebServiceDefinition::new(server.uri(), "items").with_offset_paging("start", 1);
    let store = WebServiceStore::new(definition).unwrap();

    for (start, ids) in [("1", vec![1, 2]), ("3", vec![3, 4]), ("5", vec![5])] {
        let body: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "title": format!("t{id}")}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("start", start))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(body)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let options = FetchOptions::new();
    let batch = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(
        common::titles(&batch.records),
        vec!["t1", "t2", "t3", "t4", "t5"]
    );
    assert!(!batch.cursor.has_more());
}

#[tokio::test]
async fn test_atomic_result_wrapper() {
    let server = MockServer::start().await;
    let definition = WebServiceDefinition::new(server.uri(), "search")
        .with_atomic_result_key("response")
        .with_results_key("docs");
    let store = WebServiceStore::new(definition).unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [{ "docs": [{"id": "x", "title": "wrapped"}] }]
        })))
        .mount(&server)
        .await;

    let options = FetchOptions::new();
    let batch = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&batch.records), vec!["wrapped"]);
}

#[tokio::test]
async fn test_token_paging() {
    let server = MockServer::start().await;
    let definition = WebServiceDefinition::new(server.uri(), "items")
        .with_results_key("items")
        .with_batch_size_parameter("pageSize")
        .with_token_paging("nextPageToken", "pageToken");
    let store = WebServiceStore::new(definition).unwrap();
    assert_eq!(store.paging_scheme(), PagingScheme::Token);

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param_is_missing("pageToken"))
        .and(query_param("pageSize", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1, "title": "one"}, {"id": 2, "title": "two"}],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 3, "title": "three"}]
        })))
        .mount(&server)
        .await;

    let options = FetchOptions::new().with_page_size(2);
    let first = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&first.records), vec!["one", "two"]);
    assert_eq!(first.records[1].id().unwrap().as_str(), "2");
    assert!(first.cursor.has_more());

    let second = store.fetch(&options, &first.cursor).await.unwrap();
    assert_eq!(common::titles(&second.records), vec!["three"]);
    assert!(!second.cursor.has_more());

    // Resuming from a saved token
    let resumed = FetchOptions::new()
        .with_page_size(2)
        .with_continuation_token("page-2");
    let batch = store.fetch(&resumed, &BatchCursor::start(&resumed)).await.unwrap();
    assert_eq!(common::titles(&batch.records), vec!["three"]);
}

async fn mount_link_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "a", "title": "one"}, {"id": "b", "title": "two"}],
            "links": { "next": "/items?page=2" }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "c", "title": "three"}],
            "links": { "next": null }
        })))
        .mount(server)
        .await;
}

fn link_store(server: &MockServer) -> WebServiceStore {
    WebServiceStore::new(
        WebServiceDefinition::new(server.uri(), "items")
            .with_results_key("data")
            .with_link_paging("links.next"),
    )
    .unwrap()
}

#[tokio::test]
async fn test_link_paging_follows_relative_links() {
    let server = MockServer::start().await;
    mount_link_pages(&server).await;
    let store = link_store(&server);

    let options = FetchOptions::new().with_page_size(2);
    let first = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&first.records), vec!["one", "two"]);
    assert!(first.cursor.has_more());

    let second = store.fetch(&options, &first.cursor).await.unwrap();
    assert_eq!(common::titles(&second.records), vec!["three"]);
    assert!(!second.cursor.has_more());

    let done = store.fetch(&options, &second.cursor).await.unwrap();
    assert!(done.records.is_empty());
}

#[tokio::test]
async fn test_unpaged_fetch_follows_every_link() {
    let server = MockServer::start().await;
    mount_link_pages(&server).await;
    let store = link_store(&server);

    let options = FetchOptions::new();
    let batch = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&batch.records), vec!["one", "two", "three"]);
    assert!(!batch.cursor.has_more());
}

#[tokio::test]
async fn test_unpaged_service_is_sliced_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "title": "one"},
            {"id": 2, "title": "two"},
            {"id": 3, "title": "three"}
        ])))
        .mount(&server)
        .await;
    let store = WebServiceStore::new(WebServiceDefinition::new(server.uri(), "items")).unwrap();

    let options = FetchOptions::new().with_page_size(2);
    let first = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&first.records), vec!["one", "two"]);
    assert!(first.cursor.has_more());

    let second = store.fetch(&options, &first.cursor).await.unwrap();
    assert_eq!(common::titles(&second.records), vec!["three"]);
    assert!(!second.cursor.has_more());
}

#[tokio::test]
async fn test_error_statuses_map_to_store_errors() {
    let cases = [
        (503, "unavailable"),
        (404, "not_found"),
        (422, "validation_rejected"),
        (500, "unexpected"),
    ];
    for (status, expected) in cases {
        let (server, store) = common::setup_parse_mock().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let options = FetchOptions::new().with_page_size(2);
        let err = store
            .fetch(&options, &BatchCursor::start(&options))
            .await
            .unwrap_err();
        let kind = match err {
            StoreError::ConnectionUnavailable(_) => "unavailable",
            StoreError::NotFound(_) => "not_found",
            StoreError::ValidationRejected(_) => "validation_rejected",
            StoreError::Unexpected(_) => "unexpected",
            StoreError::InvalidConfiguration(_) => "invalid_configuration",
        };
        assert_eq!(kind, expected, "HTTP {status}");
    }
}

#[tokio::test]
async fn test_undecodable_body_is_unexpected() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let options = FetchOptions::new();
    let err = store
        .fetch(&options, &BatchCursor::start(&options))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unexpected(_)));
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [common::parse_task("a", "one")]
        })))
        .mount(&server)
        .await;

    let options = FetchOptions::new().with_page_size(5);
    let batch = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
    assert_eq!(common::titles(&batch.records), vec!["one"]);
}

#[tokio::test]
async fn test_persistent_throttling_is_connection_unavailable() {
    let server = MockServer::start().await;
    let mut definition = common::parse_definition(&server);
    definition.max_retries = 1;
    let store = WebServiceStore::new(definition).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let options = FetchOptions::new();
    let err = store
        .fetch(&options, &BatchCursor::start(&options))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConnectionUnavailable(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_connection_unavailable() {
    // Port 1 is privileged and never bound by the test servers
    let mut definition =
        WebServiceDefinition::parse_class("http://127.0.0.1:1/parse", "Task", "app", "key");
    definition.timeout_secs = 5;

    let store = WebServiceStore::new(definition).unwrap();
    let options = FetchOptions::new();
    let err = store
        .fetch(&options, &BatchCursor::start(&options))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "got {err:?}");
}

#[tokio::test]
async fn test_mismatched_options_fail_before_any_request() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let options = FetchOptions::new().with_continuation_token("t");
    let err = store
        .fetch(&options, &BatchCursor::start(&options))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfiguration(_)));
}
