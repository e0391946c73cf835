//! ItemsController driving a web service store

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use itemstore_core::domain::{ConnectionPolicies, FetchOptions, NoConnectionPolicy, Record};
use itemstore_core::ports::{ChangeEvent, EventLog};
use itemstore_core::usecases::{ItemsController, MutationOutcome, PageOutcome};

use crate::common;

#[tokio::test]
async fn test_controller_pages_through_web_service() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Task"))
        .and(query_param("skip", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                common::parse_task("a", "one"),
                common::parse_task("b", "two"),
                common::parse_task("c", "three")
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Task"))
        .and(query_param("skip", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [common::parse_task("c", "three")]
        })))
        .mount(&server)
        .await;

    let log = Arc::new(EventLog::new());
    let controller = ItemsController::new(
        Arc::new(store),
        FetchOptions::new().with_page_size(2),
        log.clone(),
    );

    let outcome = controller.request_next_page().await.unwrap();
    assert_eq!(
        outcome,
        PageOutcome::Appended {
            range: 0..2,
            has_more: true
        }
    );
    controller.request_next_page().await.unwrap();
    assert_eq!(common::titles(&controller.items()), vec!["one", "two", "three"]);
    assert!(!controller.has_more());
    assert_eq!(
        controller.request_next_page().await.unwrap(),
        PageOutcome::FullyLoaded
    );

    assert_eq!(
        log.events(),
        vec![
            ChangeEvent::LoadingStateChanged { loading: true },
            ChangeEvent::ItemsAppended { range: 0..2 },
            ChangeEvent::LoadingStateChanged { loading: false },
            ChangeEvent::LoadingStateChanged { loading: true },
            ChangeEvent::ItemsAppended { range: 2..3 },
            ChangeEvent::LoadingStateChanged { loading: false },
        ]
    );
}

#[tokio::test]
async fn test_deferred_insert_replays_when_service_returns() {
    let (server, store) = common::setup_parse_mock().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/parse/classes/Task"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "objectId": "late",
            "createdAt": "2026-03-01T12:00:00.000Z"
        })))
        .mount(&server)
        .await;

    let log = Arc::new(EventLog::new());
    let controller = ItemsController::new(Arc::new(store), FetchOptions::new(), log.clone())
        .with_connection_policies(ConnectionPolicies::uniform(NoConnectionPolicy::RetryLater));

    let outcome = controller
        .insert_item(Record::new().with_field("title", "offline draft"))
        .await
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Deferred);
    assert_eq!(controller.pending_operations().len(), 1);
    assert!(controller.is_empty());

    assert_eq!(controller.retry_pending().await, 1);
    assert!(controller.pending_operations().is_empty());
    assert_eq!(controller.len(), 1);
    assert_eq!(controller.item(0).unwrap().id().unwrap().as_str(), "late");
    assert_eq!(log.kinds().last(), Some(&"item_inserted"));
}
