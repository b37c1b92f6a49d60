//! Append-only audit trail of balance mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::id::{DepositId, LedgerEntryId, OrderId, UserId};
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Money leaving the balance for an order
    Debit,
    /// Compensation for a failed or refunded order
    Refund,
    /// Money arriving from a paid deposit
    Deposit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Debit => "debit",
            EntryKind::Refund => "refund",
            EntryKind::Deposit => "deposit",
        }
    }

    pub fn is_credit(&self) -> bool {
        !matches!(self, EntryKind::Debit)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryKind::Debit),
            "refund" => Ok(EntryKind::Refund),
            "deposit" => Ok(EntryKind::Deposit),
            other => Err(format!("Unknown ledger entry kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub order_id: Option<OrderId>,
    pub deposit_id: Option<DepositId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(
        user_id: UserId,
        kind: EntryKind,
        amount: Money,
        balance_before: Money,
        balance_after: Money,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            user_id,
            kind,
            amount,
            balance_before,
            balance_after,
            order_id: None,
            deposit_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_order(
        user_id: UserId,
        order_id: OrderId,
        kind: EntryKind,
        amount: Money,
        balance_before: Money,
        balance_after: Money,
    ) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::new(user_id, kind, amount, balance_before, balance_after)
        }
    }

    pub fn for_deposit(
        user_id: UserId,
        deposit_id: DepositId,
        amount: Money,
        balance_before: Money,
        balance_after: Money,
    ) -> Self {
        Self {
            deposit_id: Some(deposit_id),
            ..Self::new(
                user_id,
                EntryKind::Deposit,
                amount,
                balance_before,
                balance_after,
            )
        }
    }

    /// `balance_after = balance_before ± amount`
    pub fn is_consistent(&self) -> bool {
        let (before, after, amount) = (
            self.balance_before.amount(),
            self.balance_after.amount(),
            self.amount.amount(),
        );
        if self.kind.is_credit() {
            before.checked_add(amount) == Some(after)
        } else {
            before.checked_sub(amount) == Some(after)
        }
    }
}

/// Checks every entry and the before/after chain between consecutive
/// entries of one user, oldest first.
pub fn verify_chain(entries: &[LedgerEntry]) -> bool {
    entries.iter().all(LedgerEntry::is_consistent)
        && entries
            .windows(2)
            .all(|w| w[0].user_id != w[1].user_id || w[0].balance_after == w[1].balance_before)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(v: i64) -> Money {
        Money::new(v).unwrap()
    }

    #[test]
    fn test_debit_and_refund_are_consistent() {
        let user = UserId::new();
        let order = OrderId::new();
        let debit = LedgerEntry::for_order(
            user,
            order,
            EntryKind::Debit,
            money(55_000),
            money(100_000),
            money(45_000),
        );
        let refund = LedgerEntry::for_order(
            user,
            order,
            EntryKind::Refund,
            money(55_000),
            money(45_000),
            money(100_000),
        );
        assert!(debit.is_consistent());
        assert!(refund.is_consistent());
        assert!(verify_chain(&[debit, refund]));
    }

    #[test]
    fn test_inconsistent_entry_detected() {
        let entry = LedgerEntry::for_deposit(
            UserId::new(),
            DepositId::new(),
            money(50_000),
            money(0),
            money(40_000),
        );
        assert!(!entry.is_consistent());
    }

    #[test]
    fn test_broken_chain_detected() {
        let user = UserId::new();
        let first =
            LedgerEntry::for_deposit(user, DepositId::new(), money(10), money(0), money(10));
        let second =
            LedgerEntry::for_deposit(user, DepositId::new(), money(10), money(20), money(30));
        assert!(!verify_chain(&[first, second]));
    }
}
