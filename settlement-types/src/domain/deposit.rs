//! Deposit domain model: money flowing into the ledger.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::{DepositId, UserId};
use super::money::Money;
use crate::error::DomainError;

/// Instrument the user pays a deposit with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank virtual account
    VirtualAccount {
        #[schema(example = "014")]
        bank_code: String,
    },
    /// QR code payment
    Qris,
    /// Over-the-counter payment at a retail store
    Retail {
        #[schema(example = "ALFAMART")]
        store: String,
    },
}

impl PaymentMethod {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PaymentMethod::VirtualAccount { bank_code } if bank_code.trim().is_empty() => {
                Err("bank_code cannot be empty".into())
            }
            PaymentMethod::Retail { store } if store.trim().is_empty() => {
                Err("store cannot be empty".into())
            }
            _ => Ok(()),
        }
    }
}

/// How to pay, as issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentInstructions {
    /// Provider reference for the payment request
    pub reference_id: String,
    /// Virtual account number
    pub account_number: Option<String>,
    /// QR payload to render
    pub qr_string: Option<String>,
    /// Retail pay code
    pub payment_code: Option<String>,
    /// Fee charged on top of the amount
    #[serde(default)]
    pub fee: Money,
    /// Provider-side deadline, when it differs from ours
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "PENDING",
            DepositStatus::Success => "SUCCESS",
            DepositStatus::Failed => "FAILED",
            DepositStatus::Expired => "EXPIRED",
        }
    }

    /// A paid event may still land on a deposit we already expired locally.
    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        use DepositStatus::*;
        matches!(
            (self, next),
            (Pending, Success) | (Pending, Failed) | (Pending, Expired) | (Expired, Success)
        )
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DepositStatus::Pending),
            "SUCCESS" => Ok(DepositStatus::Success),
            "FAILED" => Ok(DepositStatus::Failed),
            "EXPIRED" => Ok(DepositStatus::Expired),
            other => Err(format!("Unknown deposit status: {}", other)),
        }
    }
}

/// A top-up request, completed only by an inbound provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Deposit {
    pub id: DepositId,
    pub user_id: UserId,
    pub method: PaymentMethod,
    pub amount: Money,
    pub fee: Money,
    pub status: DepositStatus,
    /// Absent while the provider has not acknowledged the payment request
    pub external_reference_id: Option<String>,
    pub instructions: Option<PaymentInstructions>,
    pub balance_before: Option<Money>,
    pub balance_after: Option<Money>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Deposit {
    pub fn new(user_id: UserId, method: PaymentMethod, amount: Money, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: DepositId::new(),
            user_id,
            method,
            amount,
            fee: Money::ZERO,
            status: DepositStatus::Pending,
            external_reference_id: None,
            instructions: None,
            balance_before: None,
            balance_after: None,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn attach_instructions(&mut self, instructions: PaymentInstructions) {
        self.external_reference_id = Some(instructions.reference_id.clone());
        self.fee = instructions.fee;
        self.instructions = Some(instructions);
        self.updated_at = Utc::now();
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DepositStatus::Pending && now >= self.expires_at
    }

    fn transition(&mut self, next: DepositStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Records the credit and marks the deposit `Success`.
    pub fn mark_paid(&mut self, before: Money, after: Money) -> Result<(), DomainError> {
        self.transition(DepositStatus::Success)?;
        self.balance_before = Some(before);
        self.balance_after = Some(after);
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), DomainError> {
        self.transition(DepositStatus::Failed)
    }

    pub fn expire(&mut self) -> Result<(), DomainError> {
        self.transition(DepositStatus::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit() -> Deposit {
        Deposit::new(
            UserId::new(),
            PaymentMethod::VirtualAccount {
                bank_code: "014".into(),
            },
            Money::new(50_000).unwrap(),
            Duration::hours(24),
        )
    }

    #[test]
    fn test_new_deposit_is_pending_without_reference() {
        let d = deposit();
        assert_eq!(d.status, DepositStatus::Pending);
        assert!(d.external_reference_id.is_none());
        assert!(!d.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_attach_instructions_sets_reference() {
        let mut d = deposit();
        d.attach_instructions(PaymentInstructions {
            reference_id: "PAY-1".into(),
            account_number: Some("8808123456".into()),
            qr_string: None,
            payment_code: None,
            fee: Money::new(4_000).unwrap(),
            expires_at: None,
        });
        assert_eq!(d.external_reference_id.as_deref(), Some("PAY-1"));
        assert_eq!(d.fee.amount(), 4_000);
    }

    #[test]
    fn test_late_payment_on_expired_deposit() {
        let mut d = deposit();
        d.expire().unwrap();
        d.mark_paid(Money::ZERO, Money::new(50_000).unwrap()).unwrap();
        assert_eq!(d.status, DepositStatus::Success);
        assert!(d.fail().is_err());
    }

    #[test]
    fn test_paid_twice_is_rejected() {
        let mut d = deposit();
        d.mark_paid(Money::ZERO, Money::new(50_000).unwrap()).unwrap();
        assert!(matches!(
            d.mark_paid(Money::ZERO, Money::ZERO),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_method_validation() {
        let blank = PaymentMethod::Retail { store: "".into() };
        assert!(blank.validate().is_err());
        assert!(PaymentMethod::Qris.validate().is_ok());
    }
}
