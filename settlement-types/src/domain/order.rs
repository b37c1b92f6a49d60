//! Order domain model and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::{InquiryId, OrderId, UserId};
use super::inquiry::{Inquiry, OrderKind, Target};
use super::money::Money;
use crate::error::DomainError;

/// Lifecycle of an order.
///
/// ```text
/// PendingPayment ──► Processing ──► Success ──► Refunded
///       │                 └───────► Failed
///       └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, balance untouched
    PendingPayment,
    /// Balance debited, provider outcome not yet confirmed
    Processing,
    Success,
    Failed,
    Refunded,
    /// Deadline passed before the debit happened
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Success => "SUCCESS",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::PendingPayment | OrderStatus::Processing)
    }

    /// Allowed forward transitions. Nothing ever moves backwards.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Processing)
                | (PendingPayment, Expired)
                | (Processing, Success)
                | (Processing, Failed)
                | (Success, Refunded)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(OrderStatus::PendingPayment),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "SUCCESS" => Ok(OrderStatus::Success),
            "FAILED" => Ok(OrderStatus::Failed),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            "EXPIRED" => Ok(OrderStatus::Expired),
            other => Err(format!("Unknown order status: {}", other)),
        }
    }
}

/// The unit of money movement out of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// The inquiry this order consumed (unique)
    pub inquiry_id: InquiryId,
    pub kind: OrderKind,
    pub target: Target,
    pub status: OrderStatus,
    pub amount: Money,
    pub fee: Money,
    pub discount: Money,
    /// `amount + fee - discount`; the sum debited from the balance
    pub total_payment: Money,
    /// Balance just before the debit (set when the debit happens)
    pub balance_before: Option<Money>,
    /// Balance just after the debit
    pub balance_after: Option<Money>,
    pub external_reference_id: String,
    /// Token / receipt number returned by the provider
    pub serial_number: Option<String>,
    pub failure_reason: Option<String>,
    pub voucher_code: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a `PendingPayment` order from a quote.
    pub fn from_inquiry(
        inquiry: &Inquiry,
        discount: Money,
        voucher_code: Option<String>,
    ) -> Result<Self, DomainError> {
        let gross = inquiry.amount.checked_add(inquiry.fee)?;
        if discount > gross {
            return Err(DomainError::InvalidVoucher(
                "Discount exceeds payable amount".into(),
            ));
        }
        let total_payment = gross.checked_sub(discount)?;
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            user_id: inquiry.user_id,
            inquiry_id: inquiry.id,
            kind: inquiry.kind(),
            target: inquiry.target.clone(),
            status: OrderStatus::PendingPayment,
            amount: inquiry.amount,
            fee: inquiry.fee,
            discount,
            total_payment,
            balance_before: None,
            balance_after: None,
            external_reference_id: inquiry.external_reference_id.clone(),
            serial_number: None,
            failure_reason: None,
            voucher_code,
            expires_at: inquiry.expires_at,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::PendingPayment && now >= self.expires_at
    }

    fn transition(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Records the debit and moves the order to `Processing`.
    pub fn mark_debited(&mut self, before: Money, after: Money) -> Result<(), DomainError> {
        self.transition(OrderStatus::Processing)?;
        self.balance_before = Some(before);
        self.balance_after = Some(after);
        Ok(())
    }

    pub fn succeed(
        &mut self,
        reference_id: Option<String>,
        serial_number: Option<String>,
    ) -> Result<(), DomainError> {
        self.transition(OrderStatus::Success)?;
        if let Some(reference) = reference_id.filter(|r| !r.is_empty()) {
            self.external_reference_id = reference;
        }
        if serial_number.is_some() {
            self.serial_number = serial_number;
        }
        Ok(())
    }

    /// Keys the order on the provider's reference while its outcome is unknown.
    pub fn track_reference(&mut self, reference_id: String) {
        if !reference_id.is_empty() {
            self.external_reference_id = reference_id;
            self.updated_at = Utc::now();
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn refund(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Refunded)?;
        if reason.is_some() {
            self.failure_reason = reason;
        }
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), DomainError> {
        self.transition(OrderStatus::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn money(v: i64) -> Money {
        Money::new(v).unwrap()
    }

    fn inquiry() -> Inquiry {
        Inquiry::new(
            UserId::new(),
            Target::Prepaid {
                product_code: "PLN50".into(),
                customer_number: "081234567890".into(),
            },
            money(52_500),
            money(2_500),
            None,
            "INQ-1".into(),
            Duration::minutes(15),
        )
    }

    #[test]
    fn test_order_totals() {
        let order = Order::from_inquiry(&inquiry(), money(1_000), Some("HEMAT".into())).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.total_payment, money(54_000));
        assert_eq!(order.kind, OrderKind::Prepaid);
    }

    #[test]
    fn test_discount_cannot_exceed_payable() {
        let result = Order::from_inquiry(&inquiry(), money(100_000), None);
        assert!(matches!(result, Err(DomainError::InvalidVoucher(_))));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut order = Order::from_inquiry(&inquiry(), Money::ZERO, None).unwrap();
        order.mark_debited(money(100_000), money(45_000)).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        order
            .succeed(Some("TRX-9".into()), Some("1234-5678".into()))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Success);
        assert_eq!(order.external_reference_id, "TRX-9");
        assert!(order.completed_at.is_some());
        order.refund(None).unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
    }

    #[test]
    fn test_terminal_states_do_not_reverse() {
        let mut order = Order::from_inquiry(&inquiry(), Money::ZERO, None).unwrap();
        order.mark_debited(money(100_000), money(45_000)).unwrap();
        order.fail("rejected").unwrap();
        assert!(matches!(
            order.succeed(None, None),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(order.refund(None).is_err());
        assert_eq!(order.status, OrderStatus::Failed);
    }

    #[test]
    fn test_track_reference_ignores_blank() {
        let mut order = Order::from_inquiry(&inquiry(), Money::ZERO, None).unwrap();
        let quoted = order.external_reference_id.clone();
        order.track_reference(String::new());
        assert_eq!(order.external_reference_id, quoted);
        order.track_reference("TRX-P".into());
        assert_eq!(order.external_reference_id, "TRX-P");
    }

    #[test]
    fn test_expire_only_from_pending() {
        let mut order = Order::from_inquiry(&inquiry(), Money::ZERO, None).unwrap();
        order.expire().unwrap();
        assert_eq!(order.status, OrderStatus::Expired);
        assert!(order.mark_debited(money(1), money(0)).is_err());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::Processing,
            OrderStatus::Success,
            OrderStatus::Failed,
            OrderStatus::Refunded,
            OrderStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }
}
