//! Staged inquiry (read-only quote) domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::{InquiryId, UserId};
use super::money::Money;

/// The transaction family an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Prepaid purchase (airtime, data, electricity tokens)
    Prepaid,
    /// Postpaid bill payment
    Postpaid,
    /// Bank transfer
    Transfer,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Prepaid => "prepaid",
            OrderKind::Postpaid => "postpaid",
            OrderKind::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepaid" => Ok(OrderKind::Prepaid),
            "postpaid" => Ok(OrderKind::Postpaid),
            "transfer" => Ok(OrderKind::Transfer),
            other => Err(format!("Unknown order kind: {}", other)),
        }
    }
}

/// What the money is paying for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Prepaid {
        #[schema(example = "PLN20")]
        product_code: String,
        #[schema(example = "081234567890")]
        customer_number: String,
    },
    Postpaid {
        #[schema(example = "BPJS")]
        product_code: String,
        #[schema(example = "8801234567")]
        customer_number: String,
    },
    Transfer {
        #[schema(example = "014")]
        bank_code: String,
        #[schema(example = "1234567890")]
        account_number: String,
    },
}

impl Target {
    pub fn kind(&self) -> OrderKind {
        match self {
            Target::Prepaid { .. } => OrderKind::Prepaid,
            Target::Postpaid { .. } => OrderKind::Postpaid,
            Target::Transfer { .. } => OrderKind::Transfer,
        }
    }

    /// Rejects descriptors with blank fields.
    pub fn validate(&self) -> Result<(), String> {
        let (a, b, names) = match self {
            Target::Prepaid {
                product_code,
                customer_number,
            }
            | Target::Postpaid {
                product_code,
                customer_number,
            } => (product_code, customer_number, ("product_code", "customer_number")),
            Target::Transfer {
                bank_code,
                account_number,
            } => (bank_code, account_number, ("bank_code", "account_number")),
        };
        if a.trim().is_empty() {
            return Err(format!("{} cannot be empty", names.0));
        }
        if b.trim().is_empty() {
            return Err(format!("{} cannot be empty", names.1));
        }
        if !b.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("{} must be numeric", names.1));
        }
        Ok(())
    }
}

/// A time-boxed quote preceding a confirmed settlement.
///
/// Inquiries never touch the balance. One inquiry is consumed by at most one
/// order; the store enforces that with a uniqueness constraint on the order side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Inquiry {
    pub id: InquiryId,
    pub user_id: UserId,
    pub target: Target,
    pub amount: Money,
    pub fee: Money,
    /// Account holder or bill owner, when the provider returns one
    pub customer_name: Option<String>,
    /// Reference issued by the provider for this quote
    pub external_reference_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Inquiry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        target: Target,
        amount: Money,
        fee: Money,
        customer_name: Option<String>,
        external_reference_id: String,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InquiryId::new(),
            user_id,
            target,
            amount,
            fee,
            customer_name,
            external_reference_id,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn kind(&self) -> OrderKind {
        self.target.kind()
    }

    /// Expiry is evaluated at read time; nothing evicts inquiries.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepaid() -> Target {
        Target::Prepaid {
            product_code: "PLN20".into(),
            customer_number: "081234567890".into(),
        }
    }

    #[test]
    fn test_target_kind() {
        assert_eq!(prepaid().kind(), OrderKind::Prepaid);
        let transfer = Target::Transfer {
            bank_code: "014".into(),
            account_number: "1234".into(),
        };
        assert_eq!(transfer.kind(), OrderKind::Transfer);
    }

    #[test]
    fn test_target_validation() {
        assert!(prepaid().validate().is_ok());
        let blank = Target::Postpaid {
            product_code: " ".into(),
            customer_number: "123".into(),
        };
        assert!(blank.validate().is_err());
        let letters = Target::Transfer {
            bank_code: "014".into(),
            account_number: "12ab".into(),
        };
        assert!(letters.validate().is_err());
    }

    #[test]
    fn test_target_serializes_with_kind_tag() {
        let json = serde_json::to_value(prepaid()).unwrap();
        assert_eq!(json["kind"], "prepaid");
        assert_eq!(json["product_code"], "PLN20");
    }

    #[test]
    fn test_expiry_is_monotonic() {
        let inquiry = Inquiry::new(
            UserId::new(),
            prepaid(),
            Money::new(20_000).unwrap(),
            Money::new(1_500).unwrap(),
            None,
            "REF-1".into(),
            Duration::minutes(15),
        );
        assert!(!inquiry.is_expired());
        let later = inquiry.expires_at + Duration::seconds(1);
        assert!(inquiry.is_expired_at(later));
        assert!(inquiry.is_expired_at(later + Duration::days(1)));
    }
}
