//! User and Balance domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::UserId;
use super::money::Money;
use crate::error::DomainError;

/// An end user of the payment point.
///
/// The confirmation secret (PIN) is only ever stored hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, pin_hash: String) -> Self {
        Self {
            id,
            pin_hash,
            created_at: Utc::now(),
        }
    }
}

/// The single mutable balance row of a user.
///
/// `amount` is spendable money. `pending_amount` tracks funds already
/// debited by orders whose provider outcome is still unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    pub user_id: UserId,
    pub amount: Money,
    pub pending_amount: Money,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Creates an empty balance for a new user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            amount: Money::ZERO,
            pending_amount: Money::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Creates a balance with all fields specified (for database reconstruction).
    pub fn from_parts(
        user_id: UserId,
        amount: Money,
        pending_amount: Money,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            amount,
            pending_amount,
            updated_at,
        }
    }

    /// Checks if the balance covers a debit.
    pub fn has_sufficient_funds(&self, amount: Money) -> bool {
        self.amount >= amount
    }

    /// Credits (adds) money to the balance.
    pub fn credit(&mut self, amount: Money) -> Result<(), DomainError> {
        self.amount = self.amount.checked_add(amount)?;
        Ok(())
    }

    /// Debits (subtracts) money from the balance. Never goes below zero.
    pub fn debit(&mut self, amount: Money) -> Result<(), DomainError> {
        self.amount = self.amount.checked_sub(amount)?;
        Ok(())
    }

    /// Marks already-debited funds as held by an unresolved order.
    pub fn hold(&mut self, amount: Money) -> Result<(), DomainError> {
        self.pending_amount = self.pending_amount.checked_add(amount)?;
        Ok(())
    }

    /// Releases a hold once the order resolves.
    pub fn release(&mut self, amount: Money) {
        self.pending_amount = self.pending_amount.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(v: i64) -> Money {
        Money::new(v).unwrap()
    }

    #[test]
    fn test_new_balance_is_empty() {
        let balance = Balance::new(UserId::new());
        assert_eq!(balance.amount, Money::ZERO);
        assert_eq!(balance.pending_amount, Money::ZERO);
    }

    #[test]
    fn test_credit_then_debit() {
        let mut balance = Balance::new(UserId::new());
        balance.credit(money(100_000)).unwrap();
        balance.debit(money(55_000)).unwrap();
        assert_eq!(balance.amount, money(45_000));
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut balance = Balance::new(UserId::new());
        balance.credit(money(100)).unwrap();
        let result = balance.debit(money(200));
        assert!(matches!(result, Err(DomainError::InsufficientBalance { .. })));
        assert_eq!(balance.amount, money(100));
    }

    #[test]
    fn test_hold_and_release() {
        let mut balance = Balance::new(UserId::new());
        balance.hold(money(500)).unwrap();
        assert_eq!(balance.pending_amount, money(500));
        balance.release(money(500));
        assert_eq!(balance.pending_amount, Money::ZERO);
    }
}
