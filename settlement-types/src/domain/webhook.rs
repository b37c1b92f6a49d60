//! Inbound provider webhook payloads and the delivery inbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::money::Money;

/// Status vocabulary of the provider, normalised.
///
/// Providers are loose with casing and synonyms; parsing accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(rename_all = "lowercase", example = "success")]
pub enum ProviderStatus {
    Success,
    Failed,
    Expired,
    Refunded,
    Pending,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Success => "success",
            ProviderStatus::Failed => "failed",
            ProviderStatus::Expired => "expired",
            ProviderStatus::Refunded => "refunded",
            ProviderStatus::Pending => "pending",
        }
    }
}

impl std::str::FromStr for ProviderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "paid" | "settled" | "completed" => Ok(ProviderStatus::Success),
            "failed" | "cancelled" | "canceled" | "rejected" => Ok(ProviderStatus::Failed),
            "expired" => Ok(ProviderStatus::Expired),
            "refunded" => Ok(ProviderStatus::Refunded),
            "pending" | "processing" => Ok(ProviderStatus::Pending),
            other => Err(format!("Unknown provider status: {}", other)),
        }
    }
}

impl TryFrom<String> for ProviderStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderStatus> for String {
    fn from(value: ProviderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a provider callback.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderWebhook {
    /// Provider-side reference
    pub reference_id: String,
    /// Our order or deposit id, echoed back
    pub partner_reference_id: Option<String>,
    pub status: ProviderStatus,
    pub amount: Option<Money>,
    pub serial_number: Option<String>,
    pub message: Option<String>,
}

/// What applying a webhook did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookDisposition {
    Applied,
    AlreadyApplied,
    Ignored,
}

impl WebhookDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookDisposition::Applied => "applied",
            WebhookDisposition::AlreadyApplied => "already_applied",
            WebhookDisposition::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for WebhookDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookDisposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(WebhookDisposition::Applied),
            "already_applied" => Ok(WebhookDisposition::AlreadyApplied),
            "ignored" => Ok(WebhookDisposition::Ignored),
            other => Err(format!("Unknown webhook disposition: {}", other)),
        }
    }
}

/// One authenticated provider delivery, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub reference_id: String,
    pub provider_status: ProviderStatus,
    pub payload: serde_json::Value,
    pub disposition: WebhookDisposition,
    pub created_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(
        webhook: &ProviderWebhook,
        payload: serde_json::Value,
        disposition: WebhookDisposition,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference_id: webhook.reference_id.clone(),
            provider_status: webhook.status,
            payload,
            disposition,
            created_at: Utc::now(),
        }
    }
}
