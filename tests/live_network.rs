//! Live-network scenarios against httpbin.org.
//!
//! Ignored by default; run with `cargo test -- --ignored` when outbound
//! network access is available.

use std::time::Duration;

use camo::{Config, Engine, ProxyRequest};

fn engine() -> Engine {
    Engine::new(Config {
        api_key: "test-key".to_string(),
        session_ttl: Duration::from_secs(60),
        max_sessions: 10,
        port: 0,
        request_timeout: Duration::from_secs(30),
    })
}

fn get(url: &str) -> ProxyRequest {
    ProxyRequest {
        method: "GET".to_string(),
        url: url.to_string(),
        headers: None,
        body: None,
        session_id: None,
        proxy: None,
    }
}

#[tokio::test]
#[ignore]
async fn httpbin_status_200() {
    let response = engine()
        .execute(get("https://httpbin.org/status/200"))
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.redirect_count, 0);
    assert!(response.redirect_chain.is_empty());
    assert_eq!(response.final_url, "https://httpbin.org/status/200");
}

#[tokio::test]
#[ignore]
async fn httpbin_redirect_chain() {
    let response = engine()
        .execute(get("https://httpbin.org/redirect/2"))
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.redirect_count, 2);
    assert_eq!(response.redirect_chain.len(), 2);
    assert_eq!(response.final_url, "https://httpbin.org/get");
}

#[tokio::test]
#[ignore]
async fn httpbin_303_downgrades_post() {
    let mut request = get("https://httpbin.org/redirect-to?url=/get&status_code=303");
    request.method = "POST".to_string();
    request.body = Some(serde_json::json!({"x": 1}));

    let response = engine().execute(request).await.unwrap();
    assert_eq!(response.status_code, 200);
    // httpbin's /get echoes the request URL; reaching it at all proves the
    // 303 became a GET (POST /get would be a 405)
    assert_eq!(response.body["url"], "https://httpbin.org/get");
}
