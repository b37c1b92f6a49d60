//! Integration tests for rate limiting middleware.
//!
//! These tests verify the HTTP-level behavior of rate limiting,
//! including 429 responses and proper integration with the middleware stack.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{WEBHOOK_SECRET, bootstrap_admin, create_server};

/// Helper to make a health check request.
fn health_request() -> Request<Body> {
    Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap()
}

/// Helper to make an authenticated admin request that creates a user.
fn api_request(api_key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/users")
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", api_key))
        .body(Body::from(r#"{"pin": "123456"}"#))
        .unwrap()
}

#[tokio::test]
async fn test_rate_limiting_returns_429_when_exceeded() {
    // Bootstrap uses the "anonymous" bucket, so the admin key gets its full quota of 3
    let server = create_server(3).await;
    let app = server.router();

    let api_key = bootstrap_admin(&app).await;

    for i in 1..=3 {
        let response = app.clone().oneshot(api_request(&api_key)).await.unwrap();
        assert_ne!(
            response.status(),
            StatusCode::TOO_MANY_REQUESTS,
            "Request {} should not be rate limited (quota not yet exceeded)",
            i
        );
    }

    let response = app.clone().oneshot(api_request(&api_key)).await.unwrap();

    assert_eq!(
        response.status(),
        StatusCode::TOO_MANY_REQUESTS,
        "Request should be rate limited after exceeding quota"
    );
    let retry_header: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("Rate limit exceeded")
    );
    assert_eq!(json["code"], "RATE_LIMITED");
    // Three per minute: one token comes back every 20 seconds.
    let retry_after = json["retry_after_seconds"].as_u64().unwrap();
    assert!((1..=20).contains(&retry_after));
    assert_eq!(retry_header, retry_after);
}

#[tokio::test]
async fn test_rate_limiting_health_endpoint_bypassed() {
    let server = create_server(1).await;
    let app = server.router();

    for _ in 0..10 {
        let response = app.clone().oneshot(health_request()).await.unwrap();

        assert_eq!(
            response.status(),
            StatusCode::OK,
            "Health endpoint should not be rate limited"
        );
    }
}

#[tokio::test]
async fn test_rate_limiting_webhooks_bypassed() {
    let server = create_server(1).await;
    let app = server.router();

    // Unknown reference, but correctly signed: must reach the handler every time.
    let body = br#"{"reference_id":"UNKNOWN","status":"paid"}"#;
    let signature = settlement_repo::security::sign_webhook(body, WEBHOOK_SECRET);

    for _ in 0..5 {
        let request = Request::builder()
            .method(Method::POST)
            .uri(settlement_hex::inbound::WEBHOOK_PATH)
            .header("Content-Type", "application/json")
            .header(settlement_hex::inbound::SIGNATURE_HEADER, signature.as_str())
            .body(Body::from(&body[..]))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_rate_limiting_per_key_isolation() {
    let server = create_server(2).await;
    let app = server.router();

    let admin_key = bootstrap_admin(&app).await;

    // Exhaust the admin key
    for _ in 0..2 {
        let _ = app.clone().oneshot(api_request(&admin_key)).await.unwrap();
    }
    let response = app.clone().oneshot(api_request(&admin_key)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different key still has its own quota
    let other = Request::builder()
        .uri("/api/balance")
        .header("Authorization", "Bearer sk_someone_else")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(other).await.unwrap();
    assert_eq!(
        response.status(),
        StatusCode::UNAUTHORIZED,
        "Other key should have its own quota and reach authentication"
    );
}

#[tokio::test]
async fn test_rate_limiting_response_format() {
    let server = create_server(1).await;
    let app = server.router();

    let api_key = bootstrap_admin(&app).await;

    // Use up the 1-request quota for this API key
    let _ = app.clone().oneshot(api_request(&api_key)).await;

    let response = app.clone().oneshot(api_request(&api_key)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("application/json"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(
        json.get("error").is_some(),
        "Response should have 'error' field"
    );
    assert!(
        json.get("retry_after_seconds").is_some(),
        "Response should have 'retry_after_seconds' field"
    );
}
