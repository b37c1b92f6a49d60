//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    Balance, Deposit, Inquiry, InquiryId, Order, OrderKind, PaymentMethod, Target, UserId,
    WebhookDisposition,
};

// ─────────────────────────────────────────────────────────────────────────────
// User DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a user (admin only).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    /// Six digit confirmation PIN
    #[schema(example = "123456")]
    pub pin: String,
    /// Name for the user's API key
    #[serde(default)]
    #[schema(example = "mobile-app")]
    pub key_name: Option<String>,
}

/// Response after creating a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserResponse {
    pub user_id: UserId,
    /// API key bound to the new user (shown only once)
    #[schema(example = "sk_abc123xyz...")]
    pub api_key: String,
    pub balance: BalanceResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: UserId,
    /// Spendable balance in minor units
    #[schema(example = 100000)]
    pub amount: i64,
    /// Funds debited by orders awaiting a provider outcome
    #[schema(example = 0)]
    pub pending_amount: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<Balance> for BalanceResponse {
    fn from(b: Balance) -> Self {
        Self {
            user_id: b.user_id,
            amount: b.amount.amount(),
            pending_amount: b.pending_amount.amount(),
            updated_at: b.updated_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voucher DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a voucher (admin only).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateVoucherRequest {
    #[schema(example = "HEMAT10")]
    pub code: String,
    #[schema(example = 10000)]
    pub discount: i64,
    #[serde(default)]
    #[schema(example = 50000)]
    pub min_amount: i64,
    pub valid_until: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposit DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to top up the balance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDepositRequest {
    /// Amount to credit in minor units
    #[schema(example = 50000)]
    pub amount: i64,
    pub method: PaymentMethod,
}

// ─────────────────────────────────────────────────────────────────────────────
// Inquiry / confirmation DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Quote request for prepaid purchases and postpaid bills.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillInquiryRequest {
    #[schema(example = "PLN50")]
    pub product_code: String,
    #[schema(example = "081234567890")]
    pub customer_number: String,
}

/// Quote request for bank transfers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferInquiryRequest {
    #[schema(example = "014")]
    pub bank_code: String,
    #[schema(example = "1234567890")]
    pub account_number: String,
    #[schema(example = 250000)]
    pub amount: i64,
}

/// A staged quote, valid until `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InquiryResponse {
    pub inquiry_id: InquiryId,
    pub kind: OrderKind,
    pub target: Target,
    #[schema(example = 52500)]
    pub amount: i64,
    #[schema(example = 2500)]
    pub fee: i64,
    /// `amount + fee`, before any voucher
    #[schema(example = 55000)]
    pub total: i64,
    pub customer_name: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// The quote can no longer be confirmed
    #[serde(default)]
    pub expired: bool,
}

impl From<Inquiry> for InquiryResponse {
    fn from(i: Inquiry) -> Self {
        Self {
            inquiry_id: i.id,
            kind: i.kind(),
            amount: i.amount.amount(),
            fee: i.fee.amount(),
            total: i.amount.amount().saturating_add(i.fee.amount()),
            expired: i.is_expired(),
            customer_name: i.customer_name,
            expires_at: i.expires_at,
            target: i.target,
        }
    }
}

/// Confirms a staged inquiry and moves money.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    pub inquiry_id: InquiryId,
    #[schema(example = "123456")]
    pub pin: String,
    #[serde(default)]
    #[schema(example = "HEMAT10")]
    pub voucher_code: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Status / listing
// ─────────────────────────────────────────────────────────────────────────────

/// Whatever record an id in `GET /api/status/{id}` resolved to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum StatusResponse {
    Order(Order),
    Deposit(Deposit),
    Inquiry(InquiryResponse),
}

/// Pagination for list endpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, IntoParams)]
pub struct ListParams {
    /// Page size, at most 100
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListParams {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgement returned to the provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    #[schema(example = "ok")]
    pub status: String,
    pub disposition: WebhookDisposition,
}

impl WebhookAck {
    pub fn ok(disposition: WebhookDisposition) -> Self {
        Self {
            status: "ok".into(),
            disposition,
        }
    }
}
