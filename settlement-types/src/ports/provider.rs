//! Settlement provider port.
//!
//! The external gateway is untrusted and may be slow. Every call resolves to
//! a [`ProviderOutcome`] so callers cannot treat "no answer" as success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Money, PaymentInstructions, PaymentMethod, Target, UserId};

/// Three-way classification of a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome<T> {
    /// Definitive success
    Success(T),
    /// Definitive failure; nothing happened on the provider side
    Failure(String),
    /// Unknown: the provider may or may not have acted
    Indeterminate(Unconfirmed),
}

/// What is known about a call whose effect is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unconfirmed {
    pub reason: String,
    /// Reference the provider assigned, when it acknowledged the request
    /// without settling it. Later webhooks are keyed on it.
    pub reference_id: Option<String>,
}

impl Unconfirmed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            reference_id: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }
}

impl std::fmt::Display for Unconfirmed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reference_id {
            Some(reference) => write!(f, "{} (reference {})", self.reason, reference),
            None => f.write_str(&self.reason),
        }
    }
}

impl From<String> for Unconfirmed {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<&str> for Unconfirmed {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl<T> ProviderOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProviderOutcome<U> {
        match self {
            ProviderOutcome::Success(v) => ProviderOutcome::Success(f(v)),
            ProviderOutcome::Failure(r) => ProviderOutcome::Failure(r),
            ProviderOutcome::Indeterminate(r) => ProviderOutcome::Indeterminate(r),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderOutcome::Success(_) => "success",
            ProviderOutcome::Failure(_) => "failure",
            ProviderOutcome::Indeterminate(_) => "indeterminate",
        }
    }
}

/// Read-only quote request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub user_id: UserId,
    pub target: Target,
    /// Caller-chosen amount (transfers); bills are priced by the provider
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderQuote {
    pub reference_id: String,
    pub amount: Money,
    pub fee: Money,
    pub customer_name: Option<String>,
}

/// Asks the provider to issue payment instructions for a deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Our deposit id
    pub partner_reference_id: String,
    pub method: PaymentMethod,
    pub amount: Money,
    pub expires_at: DateTime<Utc>,
}

/// Executes a quoted purchase or transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Our order id; the provider deduplicates on it
    pub partner_reference_id: String,
    /// Reference of the quote being executed
    pub inquiry_reference_id: String,
    pub target: Target,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub reference_id: String,
    /// Token or receipt number
    pub serial_number: Option<String>,
    pub message: Option<String>,
}

/// Port trait for the external settlement gateway.
#[async_trait::async_trait]
pub trait SettlementProvider: Send + Sync {
    async fn inquire(&self, req: &QuoteRequest) -> ProviderOutcome<ProviderQuote>;

    async fn create_payment(&self, req: &PaymentRequest) -> ProviderOutcome<PaymentInstructions>;

    /// Prepaid purchases and postpaid bill payments.
    async fn create_transaction(&self, req: &ExecuteRequest) -> ProviderOutcome<ProviderReceipt>;

    async fn transfer_execute(&self, req: &ExecuteRequest) -> ProviderOutcome<ProviderReceipt>;
}
