//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use settlement_hex::{SettlementConfig, SettlementService, inbound::HttpServer};
use settlement_repo::SqliteRepo;
use settlement_types::{
    ExecuteRequest, Money, PaymentInstructions, PaymentRequest, ProviderOutcome, ProviderQuote,
    ProviderReceipt, QuoteRequest, SettlementProvider,
};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Provider that always quotes 52,500 + 2,500 and settles successfully.
pub struct StubProvider;

#[async_trait]
impl SettlementProvider for StubProvider {
    async fn inquire(&self, req: &QuoteRequest) -> ProviderOutcome<ProviderQuote> {
        ProviderOutcome::Success(ProviderQuote {
            reference_id: "INQ-1".into(),
            amount: req.amount.unwrap_or(Money::new(52_500).unwrap_or(Money::ZERO)),
            fee: Money::new(2_500).unwrap_or(Money::ZERO),
            customer_name: Some("BUDI SANTOSO".into()),
        })
    }

    async fn create_payment(&self, _req: &PaymentRequest) -> ProviderOutcome<PaymentInstructions> {
        ProviderOutcome::Success(PaymentInstructions {
            reference_id: "PAY-1".into(),
            account_number: Some("8808123456789".into()),
            qr_string: None,
            payment_code: None,
            fee: Money::ZERO,
            expires_at: None,
        })
    }

    async fn create_transaction(&self, _req: &ExecuteRequest) -> ProviderOutcome<ProviderReceipt> {
        ProviderOutcome::Success(ProviderReceipt {
            reference_id: "TRX-1".into(),
            serial_number: Some("1234-5678".into()),
            message: None,
        })
    }

    async fn transfer_execute(&self, _req: &ExecuteRequest) -> ProviderOutcome<ProviderReceipt> {
        ProviderOutcome::Success(ProviderReceipt {
            reference_id: "TRF-1".into(),
            serial_number: None,
            message: None,
        })
    }
}

/// Service over in-memory SQLite and the stub provider.
pub async fn create_service() -> SettlementService<SqliteRepo> {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let config = SettlementConfig {
        webhook_secret: WEBHOOK_SECRET.into(),
        provider_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    SettlementService::new(repo, Arc::new(StubProvider), config)
}

pub async fn create_server(requests_per_minute: u32) -> HttpServer<SqliteRepo> {
    HttpServer::with_rate_limit(create_service().await, requests_per_minute)
}

pub fn json_request(
    method: Method,
    uri: &str,
    api_key: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

/// Sends a request and returns the status with the JSON body (or `Null`).
pub async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Bootstraps the admin key.
pub async fn bootstrap_admin(app: &axum::Router) -> String {
    let (status, json) = send(
        app,
        json_request(
            Method::POST,
            "/api/bootstrap",
            None,
            serde_json::json!({"name": "test-admin"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["api_key"].as_str().unwrap().to_string()
}

/// Creates a user with PIN 123456 and returns its API key.
pub async fn create_user_key(app: &axum::Router, admin_key: &str) -> String {
    let (status, json) = send(
        app,
        json_request(
            Method::POST,
            "/api/users",
            Some(admin_key),
            serde_json::json!({"pin": "123456"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["api_key"].as_str().unwrap().to_string()
}
