//! REST surface tests driven through the router with tower's oneshot.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use camo::{api, Config, Engine};

mod helpers;
use helpers::upstream::start_upstream;

fn test_engine(max_sessions: usize) -> Arc<Engine> {
    Arc::new(Engine::new(Config {
        api_key: "test-key".to_string(),
        session_ttl: Duration::from_secs(60),
        max_sessions,
        port: 0,
        request_timeout: Duration::from_secs(5),
    }))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn authed(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", "test-key")
        .body(body.to_string())
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = api::router(test_engine(100));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["max_sessions"], 100);
}

#[tokio::test]
async fn missing_api_key_yields_unauthorized_envelope() {
    let app = api::router(test_engine(100));
    let request = Request::builder()
        .method("POST")
        .uri("/proxy/request")
        .header("content-type", "application/json")
        .body(r#"{"method":"GET","url":"https://example.com/"}"#.to_string())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn wrong_api_key_is_rejected() {
    let app = api::router(test_engine(100));
    let request = Request::builder()
        .method("POST")
        .uri("/proxy/session/create")
        .header("x-api-key", "not-the-key")
        .body(String::new())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_lifecycle_round_trip() {
    let engine = test_engine(100);
    let app = api::router(engine.clone());

    // create
    let response = app
        .clone()
        .oneshot(authed("POST", "/proxy/session/create", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let session_id = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(engine.active_sessions(), 1);

    // cookies of a fresh session are empty
    let response = app
        .clone()
        .oneshot(authed(
            "GET",
            &format!("/proxy/session/{}/cookies", session_id),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = body_json(response).await;
    assert_eq!(cookies["cookies"], serde_json::json!({}));

    // delete
    let response = app
        .clone()
        .oneshot(authed(
            "DELETE",
            &format!("/proxy/session/{}", session_id),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // cookies after delete is a 404 with the envelope
    let response = app
        .clone()
        .oneshot(authed(
            "GET",
            &format!("/proxy/session/{}/cookies", session_id),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "session_not_found");

    // deleting again is a 404 (registry delete is idempotent, surface is not)
    let response = app
        .oneshot(authed(
            "DELETE",
            &format!("/proxy/session/{}", session_id),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn capacity_exhaustion_maps_to_400() {
    let app = api::router(test_engine(1));

    let response = app
        .clone()
        .oneshot(authed("POST", "/proxy/session/create", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed("POST", "/proxy/session/create", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "capacity_exhausted");

    // Deleting frees the slot
    let response = app
        .clone()
        .oneshot(authed(
            "DELETE",
            &format!("/proxy/session/{}", session_id),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed("POST", "/proxy/session/create", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_descriptor_maps_to_bad_request() {
    let app = api::router(test_engine(100));
    let response = app
        .oneshot(authed(
            "POST",
            "/proxy/request",
            r#"{"method":"GET","url":"ftp://example.com/"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn proxied_request_round_trip_through_surface() {
    let base = start_upstream().await;
    let app = api::router(test_engine(100));

    let descriptor = serde_json::json!({
        "method": "GET",
        "url": format!("{}/get", base),
    });
    let response = app
        .oneshot(authed("POST", "/proxy/request", &descriptor.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status_code"], 200);
    assert_eq!(body["redirect_count"], 0);
    assert_eq!(body["redirect_chain"], serde_json::json!([]));
    assert_eq!(body["body"]["method"], "GET");
    assert!(body["elapsed_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn upstream_failures_map_to_bad_gateway() {
    let app = api::router(test_engine(100));
    let descriptor = serde_json::json!({
        "method": "GET",
        "url": "http://127.0.0.1:1/",
    });
    let response = app
        .oneshot(authed("POST", "/proxy/request", &descriptor.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "upstream_dial");
}
