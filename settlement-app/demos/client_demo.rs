//! Client demo: top-up, purchase and history against an in-process server.
//!
//! A mock provider gateway runs alongside the API so the whole flow works offline.
//!
//! Run with: cargo run -p settlement-app --example client_demo --no-default-features --features sqlite

use std::sync::Arc;

use axum::{Json, Router, routing::post};
use serde_json::{Value, json};
use settlement_client::SettlementClient;
use settlement_hex::{HttpProvider, ProviderConfig, SettlementConfig, SettlementService, inbound::HttpServer};
use settlement_repo::{build_repo, security::sign_webhook};
use settlement_types::{ListParams, PaymentMethod};
use tempfile::tempdir;
use tokio::net::TcpListener;

const WEBHOOK_SECRET: &str = "whsec_demo";

/// Minimal stand-in for the upstream provider.
fn mock_gateway() -> Router {
    Router::new()
        .route(
            "/v1/inquiry",
            post(|Json(_): Json<Value>| async {
                Json(json!({
                    "status": "success",
                    "reference_id": "INQ-DEMO",
                    "amount": 52500,
                    "fee": 2500,
                    "customer_name": "BUDI SANTOSO"
                }))
            }),
        )
        .route(
            "/v1/payments",
            post(|| async {
                Json(json!({
                    "status": "success",
                    "reference_id": "PAY-DEMO",
                    "account_number": "8808123456789"
                }))
            }),
        )
        .route(
            "/v1/transactions",
            post(|| async {
                Json(json!({
                    "status": "success",
                    "reference_id": "TRX-DEMO",
                    "serial_number": "5521-0987-6543"
                }))
            }),
        )
}

async fn spawn(router: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("server stopped: {e}");
        }
    });
    Ok(format!("http://{addr}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    let gateway_url = spawn(mock_gateway()).await?;

    // Use a temp file-backed SQLite DB
    let tmp = tempdir()?;
    let db_path = tmp.path().join("settlement.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server...");
    println!("   Database: {db_url}");
    println!("   Provider: {gateway_url}");

    let repo = build_repo(&db_url).await?;
    let provider = HttpProvider::new(ProviderConfig {
        base_url: gateway_url,
        client_id: "demo".into(),
        credential: "demo".into(),
        timeout: std::time::Duration::from_secs(5),
    })?;
    let config = SettlementConfig {
        webhook_secret: WEBHOOK_SECRET.into(),
        ..SettlementConfig::default()
    };
    let service = SettlementService::new(repo, Arc::new(provider), config);
    let base_url = spawn(HttpServer::new(service).router()).await?;

    let client = SettlementClient::new(&base_url);

    let health = client.health().await?;
    println!("✅ Server health: {health}");

    let response = client.balance().await;
    assert!(response.is_err());
    println!("✅ Unauthorized without key: {}", response.unwrap_err());

    let admin = SettlementClient::new(&base_url).with_api_key(client.bootstrap("demo").await?);
    let created = admin.create_user("123456", Some("demo-user".into())).await?;
    println!("✅ Created user {}", created.user_id);

    let user = SettlementClient::new(&base_url).with_api_key(created.api_key);

    // Top up, then play the provider's paid callback
    let deposit = user
        .create_deposit(
            100_000,
            PaymentMethod::VirtualAccount {
                bank_code: "014".into(),
            },
        )
        .await?;
    println!("✅ Deposit {} is {}", deposit.id, deposit.status);

    let payload = json!({"reference_id": "PAY-DEMO", "status": "paid", "amount": 100000}).to_string();
    let signature = sign_webhook(payload.as_bytes(), WEBHOOK_SECRET);
    let ack = user.deliver_webhook(payload, &signature).await?;
    println!("✅ Webhook {:?}", ack.disposition);
    println!("   Balance: {}", user.balance().await?.amount);

    // Quote, then pay
    let inquiry = user.prepaid_inquiry("PLN50", "081234567890").await?;
    println!(
        "✅ Quote {}: {} + {} fee = {}",
        inquiry.inquiry_id, inquiry.amount, inquiry.fee, inquiry.total
    );

    let order = user.pay_prepaid(inquiry.inquiry_id, "123456", None).await?;
    println!(
        "✅ Order {} is {} (token {})",
        order.id,
        order.status,
        order.serial_number.as_deref().unwrap_or("-")
    );
    println!("   Balance: {}", user.balance().await?.amount);

    println!("\n📋 Ledger:");
    for entry in user.ledger(ListParams::default()).await? {
        println!(
            "   - {:<8} {:>8}  {} -> {}",
            entry.kind, entry.amount, entry.balance_before, entry.balance_after
        );
    }

    println!("\n🎉 Demo completed successfully!");

    Ok(())
}
