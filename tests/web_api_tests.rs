//! Integration tests for the web API.
//!
//! These tests verify the RPC endpoints work correctly.

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use trackside::config::{ConfigEvent, ControllerSettings};
use trackside::service::{ServiceOptions, TracksideService};
use trackside::transport::{MockBroker, MockTrainApi};
use trackside::web::{build_router, ApiResponse, StatusResponse, WebServerConfig};
use trackside::TrainRecord;

type Service = Arc<TracksideService<MockBroker, MockTrainApi>>;

fn create_test_app() -> (axum::Router, Service) {
    let service = TracksideService::with_options(
        MockBroker::new(),
        MockTrainApi::new(),
        ServiceOptions {
            retry_interval: Duration::from_millis(10),
            sample_interval_ms: 0,
        },
    );
    let config = WebServerConfig::default();
    let router = build_router(Arc::clone(&service), &config);
    (router, service)
}

fn configure_controller(service: &Service, inventory: &str) {
    service.sender().api().set_inventory(Some(inventory));
    service.handle_event(ConfigEvent::Controller(Some(ControllerSettings::new(
        "controller:5000",
        "5",
    ))));
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_get_status_initial() {
    let (app, _service) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<StatusResponse> = body_json(response).await;

    assert!(json.success);
    let data = json.data.unwrap();
    assert_eq!(data.connection, "disconnected");
    assert!(data.topics.is_empty());
    assert_eq!(data.train_count, 0);
    assert!(data.latest_sensor.is_none());
}

#[tokio::test]
async fn test_get_trains_after_reconcile() {
    let (app, service) = create_test_app();
    configure_controller(&service, r#"[{"5": {"speed": 0}}, {"7": {"speed": 20}}]"#);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/trains")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<Vec<TrainRecord>> = body_json(response).await;

    let trains = json.data.unwrap();
    assert_eq!(trains.len(), 2);
    assert_eq!(trains[0].loco_id, "5");
    assert_eq!(trains[1].loco_id, "7");
}

#[tokio::test]
async fn test_control_train_sends_fragments() {
    let (app, service) = create_test_app();
    configure_controller(&service, "[]");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/train/control")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"loco_id": "7", "commands": [{"speed": 30}, {"bell": "on"}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<trackside::ControlOutcome> = body_json(response).await;

    assert!(json.success);
    let outcome = json.data.unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.failed, 0);

    let sent = service.sender().api().sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].loco_id, "7");
    assert_eq!(sent[0].payload, r#"{"speed":30}"#);
    assert_eq!(sent[1].payload, r#"{"bell":"on"}"#);
}

#[tokio::test]
async fn test_control_train_missing_loco_id_fails() {
    let (app, service) = create_test_app();
    configure_controller(&service, "[]");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/train/control")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"loco_id": "", "commands": [{"speed": 30}]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<trackside::ControlOutcome> = body_json(response).await;
    assert!(!json.success);
    assert!(service.sender().api().sent().is_empty());
}

#[tokio::test]
async fn test_control_train_invalid_body_rejected() {
    let (app, _service) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/train/control")
                .header("Content-Type", "application/json")
                .body(Body::from("not-json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_inventory_refresh_reports_count() {
    let (app, service) = create_test_app();
    configure_controller(&service, r#"[{"5": {}}]"#);

    // Controller now reports another train; refresh picks it up
    service
        .sender()
        .api()
        .set_inventory(Some(r#"[{"5": {}}, {"9": {}}]"#));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/inventory/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<usize> = body_json(response).await;
    assert!(json.success);
    assert_eq!(json.data, Some(2));
}

#[tokio::test]
async fn test_reset_clears_state() {
    let (app, service) = create_test_app();
    configure_controller(&service, r#"[{"5": {}}]"#);
    assert_eq!(service.trains().len(), 1);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: ApiResponse<String> = body_json(response).await;
    assert!(json.success);
    assert!(service.trains().is_empty());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _service) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: ApiResponse<()> = body_json(response).await;
    assert!(!json.success);
}
