//! HttpProvider against a local mock gateway.

use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde_json::{Value, json};

use settlement_hex::{HttpProvider, ProviderConfig};
use settlement_types::{
    ExecuteRequest, Money, PaymentMethod, PaymentRequest, ProviderOutcome, QuoteRequest,
    SettlementProvider, Target, UserId,
};

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-Client-Id").and_then(|v| v.to_str().ok()) == Some("partner-1")
        && headers.get("Authorization").and_then(|v| v.to_str().ok()) == Some("Bearer s3cret")
}

async fn inquiry(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad credentials"})));
    }
    if body["target"]["customer_number"] == "000" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "failed", "message": "customer not found"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "reference_id": "INQ-9",
            "amount": 52500,
            "fee": 2500,
            "customer_name": "BUDI SANTOSO"
        })),
    )
}

async fn transaction(Json(body): Json<Value>) -> impl IntoResponse {
    match body["partner_reference_id"].as_str() {
        Some("pending") => Json(json!({"status": "pending", "reference_id": "TRX-P"})),
        _ => Json(json!({
            "status": "success",
            "reference_id": "TRX-9",
            "serial_number": "1111-2222"
        })),
    }
}

async fn transfer() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream down")
}

async fn slow_payment() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({"status": "success", "reference_id": "PAY-LATE"}))
}

async fn spawn_gateway() -> String {
    let app = Router::new()
        .route("/v1/inquiry", post(inquiry))
        .route("/v1/transactions", post(transaction))
        .route("/v1/transfers", post(transfer))
        .route("/v1/payments", post(slow_payment));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn provider(base_url: String, credential: &str) -> HttpProvider {
    HttpProvider::new(ProviderConfig {
        base_url,
        client_id: "partner-1".into(),
        credential: credential.into(),
        timeout: Duration::from_millis(500),
    })
    .unwrap()
}

fn prepaid(customer_number: &str) -> Target {
    Target::Prepaid {
        product_code: "PLN50".into(),
        customer_number: customer_number.into(),
    }
}

fn execute(partner_reference_id: &str) -> ExecuteRequest {
    ExecuteRequest {
        partner_reference_id: partner_reference_id.into(),
        inquiry_reference_id: "INQ-9".into(),
        target: prepaid("081234567890"),
        amount: Money::new(52_500).unwrap(),
    }
}

#[tokio::test]
async fn test_inquiry_success_and_rejection() {
    let base = spawn_gateway().await;
    let provider = provider(base, "s3cret");

    let ok = provider
        .inquire(&QuoteRequest {
            user_id: UserId::new(),
            target: prepaid("081234567890"),
            amount: None,
        })
        .await;
    match ok {
        ProviderOutcome::Success(quote) => {
            assert_eq!(quote.reference_id, "INQ-9");
            assert_eq!(quote.amount.amount(), 52_500);
            assert_eq!(quote.fee.amount(), 2_500);
            assert_eq!(quote.customer_name.as_deref(), Some("BUDI SANTOSO"));
        }
        other => panic!("expected success, got {:?}", other),
    }

    let rejected = provider
        .inquire(&QuoteRequest {
            user_id: UserId::new(),
            target: prepaid("000"),
            amount: None,
        })
        .await;
    assert_eq!(
        rejected,
        ProviderOutcome::Failure("customer not found".into())
    );
}

#[tokio::test]
async fn test_wrong_credentials_are_a_failure() {
    let base = spawn_gateway().await;
    let provider = provider(base, "wrong");

    let outcome = provider
        .inquire(&QuoteRequest {
            user_id: UserId::new(),
            target: prepaid("081234567890"),
            amount: None,
        })
        .await;

    assert_eq!(outcome, ProviderOutcome::Failure("bad credentials".into()));
}

#[tokio::test]
async fn test_transaction_outcomes() {
    let base = spawn_gateway().await;
    let provider = provider(base, "s3cret");

    match provider.create_transaction(&execute("order-1")).await {
        ProviderOutcome::Success(receipt) => {
            assert_eq!(receipt.reference_id, "TRX-9");
            assert_eq!(receipt.serial_number.as_deref(), Some("1111-2222"));
        }
        other => panic!("expected success, got {:?}", other),
    }

    match provider.create_transaction(&execute("pending")).await {
        ProviderOutcome::Indeterminate(unconfirmed) => {
            assert_eq!(unconfirmed.reference_id.as_deref(), Some("TRX-P"));
        }
        other => panic!("expected indeterminate, got {:?}", other),
    }

    let upstream_down = provider.transfer_execute(&execute("order-2")).await;
    assert!(matches!(upstream_down, ProviderOutcome::Indeterminate(_)));
}

#[tokio::test]
async fn test_timeout_is_indeterminate() {
    let base = spawn_gateway().await;
    let provider = provider(base, "s3cret");

    let outcome = provider
        .create_payment(&PaymentRequest {
            partner_reference_id: "dep-1".into(),
            method: PaymentMethod::Qris,
            amount: Money::new(50_000).unwrap(),
            expires_at: chrono::Utc::now(),
        })
        .await;

    assert!(matches!(outcome, ProviderOutcome::Indeterminate(_)));
}

#[tokio::test]
async fn test_unreachable_gateway_is_indeterminate() {
    // Nothing listens on port 9 of localhost.
    let provider = provider("http://127.0.0.1:9".into(), "s3cret");

    let outcome = provider.transfer_execute(&execute("order-3")).await;

    assert!(matches!(outcome, ProviderOutcome::Indeterminate(_)));
}
