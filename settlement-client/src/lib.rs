//! # Settlement Client SDK
//!
//! A typed Rust client for the settlement API.

use settlement_types::{
    BalanceResponse, BillInquiryRequest, ConfirmRequest, CreateDepositRequest, CreateUserRequest,
    CreateUserResponse, CreateVoucherRequest, Deposit, InquiryId, InquiryResponse, LedgerEntry,
    ListParams, Order, PaymentMethod, StatusResponse, TransferInquiryRequest, Voucher, WebhookAck,
};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} {code} - {message}")]
    Api {
        status: u16,
        /// Machine-readable error code, e.g. `INSUFFICIENT_BALANCE`
        code: String,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Error code reported by the server, if the failure came from the API.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct BootstrapRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct BootstrapResponse {
    api_key: String,
}

/// Settlement API client.
pub struct SettlementClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl SettlementClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    /// Creates the first admin key. Returns the raw key.
    pub async fn bootstrap(&self, name: &str) -> Result<String, ClientError> {
        let resp: BootstrapResponse = self
            .post("/api/bootstrap", &BootstrapRequest { name })
            .await?;
        Ok(resp.api_key)
    }

    /// Creates a user with a zero balance (admin key required).
    pub async fn create_user(
        &self,
        pin: &str,
        key_name: Option<String>,
    ) -> Result<CreateUserResponse, ClientError> {
        let req = CreateUserRequest {
            pin: pin.to_string(),
            key_name,
        };
        self.post("/api/users", &req).await
    }

    /// Creates a voucher (admin key required).
    pub async fn create_voucher(&self, req: &CreateVoucherRequest) -> Result<Voucher, ClientError> {
        self.post("/api/vouchers", req).await
    }

    pub async fn balance(&self) -> Result<BalanceResponse, ClientError> {
        self.get("/api/balance").await
    }

    pub async fn ledger(&self, params: ListParams) -> Result<Vec<LedgerEntry>, ClientError> {
        self.get(&format!("/api/ledger{}", query(params))).await
    }

    pub async fn orders(&self, params: ListParams) -> Result<Vec<Order>, ClientError> {
        self.get(&format!("/api/orders{}", query(params))).await
    }

    /// Requests payment instructions for a top-up.
    pub async fn create_deposit(
        &self,
        amount: i64,
        method: PaymentMethod,
    ) -> Result<Deposit, ClientError> {
        let req = CreateDepositRequest { amount, method };
        self.post("/api/deposits", &req).await
    }

    pub async fn prepaid_inquiry(
        &self,
        product_code: &str,
        customer_number: &str,
    ) -> Result<InquiryResponse, ClientError> {
        self.post("/api/prepaid/inquiry", &bill(product_code, customer_number))
            .await
    }

    pub async fn pay_prepaid(
        &self,
        inquiry_id: InquiryId,
        pin: &str,
        voucher_code: Option<String>,
    ) -> Result<Order, ClientError> {
        self.post("/api/prepaid/pay", &confirm(inquiry_id, pin, voucher_code))
            .await
    }

    pub async fn postpaid_inquiry(
        &self,
        product_code: &str,
        customer_number: &str,
    ) -> Result<InquiryResponse, ClientError> {
        self.post("/api/postpaid/inquiry", &bill(product_code, customer_number))
            .await
    }

    pub async fn pay_postpaid(
        &self,
        inquiry_id: InquiryId,
        pin: &str,
        voucher_code: Option<String>,
    ) -> Result<Order, ClientError> {
        self.post("/api/postpaid/pay", &confirm(inquiry_id, pin, voucher_code))
            .await
    }

    pub async fn transfer_inquiry(
        &self,
        bank_code: &str,
        account_number: &str,
        amount: i64,
    ) -> Result<InquiryResponse, ClientError> {
        let req = TransferInquiryRequest {
            bank_code: bank_code.to_string(),
            account_number: account_number.to_string(),
            amount,
        };
        self.post("/api/transfers/inquiry", &req).await
    }

    pub async fn transfer_execute(
        &self,
        inquiry_id: InquiryId,
        pin: &str,
        voucher_code: Option<String>,
    ) -> Result<Order, ClientError> {
        self.post(
            "/api/transfers/execute",
            &confirm(inquiry_id, pin, voucher_code),
        )
        .await
    }

    /// Looks up an order, deposit or inquiry by id.
    pub async fn status(&self, id: &str) -> Result<StatusResponse, ClientError> {
        self.get(&format!("/api/status/{}", id)).await
    }

    /// Delivers a provider callback as-is. Used to simulate the provider in sandboxes.
    pub async fn deliver_webhook(
        &self,
        payload: String,
        signature: &str,
    ) -> Result<WebhookAck, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/webhooks/provider", self.base_url))
            .header("Content-Type", "application/json")
            .header("X-Signature", signature)
            .body(payload)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let mut req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(api_error(status.as_u16(), body))
        }
    }
}

fn bill(product_code: &str, customer_number: &str) -> BillInquiryRequest {
    BillInquiryRequest {
        product_code: product_code.to_string(),
        customer_number: customer_number.to_string(),
    }
}

fn confirm(inquiry_id: InquiryId, pin: &str, voucher_code: Option<String>) -> ConfirmRequest {
    ConfirmRequest {
        inquiry_id,
        pin: pin.to_string(),
        voucher_code,
    }
}

fn query(params: ListParams) -> String {
    let mut parts = Vec::new();
    if let Some(limit) = params.limit {
        parts.push(format!("limit={}", limit));
    }
    if let Some(offset) = params.offset {
        parts.push(format!("offset={}", offset));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

/// Builds an API error from a `{"error": ..., "code": ...}` body, falling back to the raw text.
fn api_error(status: u16, body: String) -> ClientError {
    let parsed = serde_json::from_str::<serde_json::Value>(&body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str())
            .map(String::from)
    };
    ClientError::Api {
        status,
        code: field("code").unwrap_or_else(|| "UNKNOWN".to_string()),
        message: field("error").unwrap_or(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SettlementClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = SettlementClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = SettlementClient::new("http://localhost:3000").with_api_key("test-key");
        assert_eq!(client.api_key, Some("test-key".to_string()));
    }

    #[test]
    fn test_query_string() {
        assert_eq!(query(ListParams::default()), "");
        assert_eq!(
            query(ListParams {
                limit: Some(5),
                offset: Some(10)
            }),
            "?limit=5&offset=10"
        );
    }

    #[test]
    fn test_api_error_reads_code() {
        let err = api_error(
            422,
            r#"{"error":"Insufficient balance","code":"INSUFFICIENT_BALANCE"}"#.to_string(),
        );
        assert_eq!(err.code(), Some("INSUFFICIENT_BALANCE"));
        assert!(err.to_string().contains("Insufficient balance"));

        let raw = api_error(502, "Bad Gateway".to_string());
        assert_eq!(raw.code(), Some("UNKNOWN"));
        assert!(raw.to_string().contains("Bad Gateway"));
    }
}
