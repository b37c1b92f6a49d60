//! reqwest adapter for the settlement provider gateway.
//!
//! Every response is classified into a [`ProviderOutcome`]. Anything that
//! does not prove success or failure is indeterminate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use settlement_types::{
    ExecuteRequest, Money, PaymentInstructions, PaymentRequest, ProviderOutcome, ProviderQuote,
    ProviderReceipt, ProviderStatus, QuoteRequest, SettlementProvider, Unconfirmed,
};

/// Connection settings for the provider gateway.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub client_id: String,
    /// Bearer credential
    pub credential: String,
    pub timeout: Duration,
}

/// Union of the provider's response fields across endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProviderResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub fee: Option<i64>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub qr_string: Option<String>,
    #[serde(default)]
    pub payment_code: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderResponse {
    /// The provider reference, when present and non-blank.
    fn reference(&self) -> Option<String> {
        self.reference_id
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}

/// Classifies one HTTP exchange.
pub fn classify(status: StatusCode, body: &str) -> ProviderOutcome<ProviderResponse> {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return ProviderOutcome::Indeterminate(format!("provider returned {}", status).into());
    }

    let parsed = serde_json::from_str::<ProviderResponse>(body);
    if status.is_client_error() {
        let message = parsed
            .ok()
            .and_then(|r| r.message)
            .unwrap_or_else(|| format!("provider returned {}", status));
        return ProviderOutcome::Failure(message);
    }
    if !status.is_success() {
        return ProviderOutcome::Indeterminate(
            format!("unexpected provider status {}", status).into(),
        );
    }

    let response = match parsed {
        Ok(r) => r,
        Err(e) => {
            return ProviderOutcome::Indeterminate(
                format!("unparseable provider response: {}", e).into(),
            );
        }
    };
    let Some(raw_status) = response.status.as_deref() else {
        return ProviderOutcome::Indeterminate(
            Unconfirmed::new("provider response without status").with_reference(response.reference()),
        );
    };

    match raw_status.parse::<ProviderStatus>() {
        Ok(ProviderStatus::Success) if response.reference().is_some() => {
            ProviderOutcome::Success(response)
        }
        Ok(ProviderStatus::Success) => {
            ProviderOutcome::Indeterminate("success without reference_id".into())
        }
        Ok(ProviderStatus::Failed) | Ok(ProviderStatus::Expired) => ProviderOutcome::Failure(
            response
                .message
                .unwrap_or_else(|| format!("provider reported {}", raw_status)),
        ),
        Ok(ProviderStatus::Pending) | Ok(ProviderStatus::Refunded) | Err(_) => {
            ProviderOutcome::Indeterminate(
                Unconfirmed::new(format!("provider reported {}", raw_status))
                    .with_reference(response.reference()),
            )
        }
    }
}

/// HTTP implementation of the [`SettlementProvider`] port.
pub struct HttpProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    #[tracing::instrument(skip(self, body))]
    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderOutcome<ProviderResponse> {
        let result = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.credential)
            .header("X-Client-Id", &self.config.client_id)
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("provider request failed: {}", e);
                return ProviderOutcome::Indeterminate(e.to_string().into());
            }
        };
        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(%status, "provider body unreadable: {}", e);
                return ProviderOutcome::Indeterminate(e.to_string().into());
            }
        };

        let outcome = classify(status, &text);
        tracing::debug!(%status, outcome = outcome.label(), "provider call classified");
        outcome
    }
}

/// A success that is missing fields we need cannot be trusted either way.
fn money_field(value: Option<i64>, name: &str) -> Result<Money, String> {
    let raw = value.ok_or_else(|| format!("provider response without {}", name))?;
    Money::new(raw).map_err(|e| e.to_string())
}

fn into_receipt(outcome: ProviderOutcome<ProviderResponse>) -> ProviderOutcome<ProviderReceipt> {
    outcome.map(|r| ProviderReceipt {
        reference_id: r.reference().unwrap_or_default(),
        serial_number: r.serial_number,
        message: r.message,
    })
}

#[async_trait]
impl SettlementProvider for HttpProvider {
    async fn inquire(&self, req: &QuoteRequest) -> ProviderOutcome<ProviderQuote> {
        match self.post("/v1/inquiry", req).await {
            ProviderOutcome::Success(r) => {
                let amount = money_field(r.amount.or(req.amount.map(|a| a.amount())), "amount");
                let fee = money_field(Some(r.fee.unwrap_or(0)), "fee");
                match (amount, fee) {
                    (Ok(amount), Ok(fee)) => ProviderOutcome::Success(ProviderQuote {
                        reference_id: r.reference().unwrap_or_default(),
                        amount,
                        fee,
                        customer_name: r.customer_name,
                    }),
                    (Err(e), _) | (_, Err(e)) => ProviderOutcome::Indeterminate(e.into()),
                }
            }
            ProviderOutcome::Failure(reason) => ProviderOutcome::Failure(reason),
            ProviderOutcome::Indeterminate(reason) => ProviderOutcome::Indeterminate(reason),
        }
    }

    async fn create_payment(&self, req: &PaymentRequest) -> ProviderOutcome<PaymentInstructions> {
        match self.post("/v1/payments", req).await {
            ProviderOutcome::Success(r) => match money_field(Some(r.fee.unwrap_or(0)), "fee") {
                Ok(fee) => ProviderOutcome::Success(PaymentInstructions {
                    reference_id: r.reference().unwrap_or_default(),
                    account_number: r.account_number,
                    qr_string: r.qr_string,
                    payment_code: r.payment_code,
                    fee,
                    expires_at: r.expires_at,
                }),
                Err(e) => ProviderOutcome::Indeterminate(e.into()),
            },
            ProviderOutcome::Failure(reason) => ProviderOutcome::Failure(reason),
            ProviderOutcome::Indeterminate(reason) => ProviderOutcome::Indeterminate(reason),
        }
    }

    async fn create_transaction(&self, req: &ExecuteRequest) -> ProviderOutcome<ProviderReceipt> {
        into_receipt(self.post("/v1/transactions", req).await)
    }

    async fn transfer_execute(&self, req: &ExecuteRequest) -> ProviderOutcome<ProviderReceipt> {
        into_receipt(self.post("/v1/transfers", req).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transport_statuses() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(matches!(
                classify(status, ""),
                ProviderOutcome::Indeterminate(_)
            ));
        }
    }

    #[test]
    fn test_classify_client_error_is_failure() {
        let outcome = classify(StatusCode::BAD_REQUEST, r#"{"message":"unknown product"}"#);
        assert_eq!(outcome, ProviderOutcome::Failure("unknown product".into()));

        let outcome = classify(StatusCode::NOT_FOUND, "not json");
        assert!(matches!(outcome, ProviderOutcome::Failure(_)));
    }

    #[test]
    fn test_classify_success_body() {
        let body = r#"{"status":"completed","reference_id":"TRX-1","serial_number":"1234"}"#;
        match classify(StatusCode::OK, body) {
            ProviderOutcome::Success(r) => {
                assert_eq!(r.reference_id.as_deref(), Some("TRX-1"));
                assert_eq!(r.serial_number.as_deref(), Some("1234"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_success_requires_reference() {
        let outcome = classify(StatusCode::OK, r#"{"status":"success","reference_id":" "}"#);
        assert!(matches!(outcome, ProviderOutcome::Indeterminate(_)));
    }

    #[test]
    fn test_classify_failed_body() {
        let outcome = classify(StatusCode::OK, r#"{"status":"rejected","message":"blocked"}"#);
        assert_eq!(outcome, ProviderOutcome::Failure("blocked".into()));
    }

    #[test]
    fn test_classify_pending_keeps_reference() {
        let body = r#"{"status":"processing","reference_id":"TRX-P"}"#;
        match classify(StatusCode::OK, body) {
            ProviderOutcome::Indeterminate(unconfirmed) => {
                assert_eq!(unconfirmed.reference_id.as_deref(), Some("TRX-P"));
            }
            other => panic!("expected indeterminate, got {:?}", other),
        }

        match classify(StatusCode::BAD_GATEWAY, body) {
            ProviderOutcome::Indeterminate(unconfirmed) => assert!(unconfirmed.reference_id.is_none()),
            other => panic!("expected indeterminate, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_ambiguous_bodies() {
        for body in [
            r#"{"status":"processing","reference_id":"TRX-1"}"#,
            r#"{"status":"teleported","reference_id":"TRX-1"}"#,
            r#"{"reference_id":"TRX-1"}"#,
            "<html>gateway</html>",
        ] {
            assert!(
                matches!(classify(StatusCode::OK, body), ProviderOutcome::Indeterminate(_)),
                "{} should be indeterminate",
                body
            );
        }
    }
}
