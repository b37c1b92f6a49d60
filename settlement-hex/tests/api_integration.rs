//! End-to-end HTTP tests over in-memory SQLite and a stub provider.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::json;

use common::{
    WEBHOOK_SECRET, bootstrap_admin, create_server, create_user_key, get_request, json_request,
    send,
};
use settlement_hex::inbound::{SIGNATURE_HEADER, WEBHOOK_PATH};
use settlement_repo::security::sign_webhook;

fn webhook_request(body: serde_json::Value, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(WEBHOOK_PATH)
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed_webhook(body: serde_json::Value) -> Request<Body> {
    let signature = sign_webhook(body.to_string().as_bytes(), WEBHOOK_SECRET);
    webhook_request(body, Some(&signature))
}

#[tokio::test]
async fn test_deposit_purchase_and_status_flow() {
    let app = create_server(1_000).await.router();
    let admin = bootstrap_admin(&app).await;
    let user = create_user_key(&app, &admin).await;

    // Top up: instructions first, credit only on the paid webhook
    let (status, deposit) = send(
        &app,
        json_request(
            Method::POST,
            "/api/deposits",
            Some(&user),
            json!({"amount": 100000, "method": {"type": "virtual_account", "bank_code": "014"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", deposit);
    assert_eq!(deposit["status"], "PENDING");
    assert_eq!(deposit["instructions"]["account_number"], "8808123456789");

    let (_, balance) = send(&app, get_request("/api/balance", Some(&user))).await;
    assert_eq!(balance["amount"], 0);

    let paid = json!({"reference_id": "PAY-1", "status": "paid", "amount": 100000});
    let (status, ack) = send(&app, signed_webhook(paid.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", ack);
    assert_eq!(ack["disposition"], "applied");

    let (status, ack) = send(&app, signed_webhook(paid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["disposition"], "already_applied");

    let (_, balance) = send(&app, get_request("/api/balance", Some(&user))).await;
    assert_eq!(balance["amount"], 100000);

    // Quote, then pay
    let (status, inquiry) = send(
        &app,
        json_request(
            Method::POST,
            "/api/prepaid/inquiry",
            Some(&user),
            json!({"product_code": "PLN50", "customer_number": "081234567890"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", inquiry);
    assert_eq!(inquiry["total"], 55000);
    let inquiry_id = inquiry["inquiry_id"].as_str().unwrap().to_string();

    let (status, order) = send(
        &app,
        json_request(
            Method::POST,
            "/api/prepaid/pay",
            Some(&user),
            json!({"inquiry_id": inquiry_id, "pin": "123456"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", order);
    assert_eq!(order["status"], "SUCCESS");
    assert_eq!(order["serial_number"], "1234-5678");
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, balance) = send(&app, get_request("/api/balance", Some(&user))).await;
    assert_eq!(balance["amount"], 45000);
    assert_eq!(balance["pending_amount"], 0);

    let (status, record) = send(
        &app,
        get_request(&format!("/api/status/{}", order_id), Some(&user)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["type"], "order");
    assert_eq!(record["record"]["status"], "SUCCESS");

    let (_, ledger) = send(&app, get_request("/api/ledger", Some(&user))).await;
    let entries = ledger.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "deposit");
    assert_eq!(entries[1]["kind"], "debit");
    assert_eq!(entries[1]["balance_after"], 45000);

    let (_, orders) = send(&app, get_request("/api/orders?limit=5", Some(&user))).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_confirm_errors_map_to_status_codes() {
    let app = create_server(1_000).await.router();
    let admin = bootstrap_admin(&app).await;
    let user = create_user_key(&app, &admin).await;

    let (_, inquiry) = send(
        &app,
        json_request(
            Method::POST,
            "/api/postpaid/inquiry",
            Some(&user),
            json!({"product_code": "BPJS", "customer_number": "8801234567"}),
        ),
    )
    .await;
    let inquiry_id = inquiry["inquiry_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/postpaid/pay",
            Some(&user),
            json!({"inquiry_id": inquiry_id, "pin": "000000"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INVALID_PIN");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/postpaid/pay",
            Some(&user),
            json!({"inquiry_id": inquiry_id, "pin": "123456"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_BALANCE");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/transfers/execute",
            Some(&user),
            json!({"inquiry_id": inquiry_id, "pin": "123456"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, get_request("/api/status/not-a-uuid", Some(&user))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let app = create_server(1_000).await.router();

    let (status, body) = send(&app, get_request("/api/balance", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let admin = bootstrap_admin(&app).await;

    // Bootstrap works only once
    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/bootstrap",
            None,
            json!({"name": "second"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Admin keys cannot move money
    let (status, body) = send(&app, get_request("/api/balance", Some(&admin))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    // User keys cannot administer
    let user = create_user_key(&app, &admin).await;
    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/users",
            Some(&user),
            json!({"pin": "123456"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get_request("/api/balance", Some("sk_bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_signature_enforced() {
    let app = create_server(1_000).await.router();
    let body = json!({"reference_id": "PAY-1", "status": "paid"});

    let (status, _) = send(&app, webhook_request(body.clone(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, webhook_request(body, Some("00ff"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_server(1_000).await.router();

    let (status, doc) = send(&app, get_request("/api-docs/openapi.json", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/prepaid/pay"].is_object());
}
