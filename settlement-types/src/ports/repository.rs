//! Repository port traits.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory) implement both traits.

use chrono::{DateTime, Utc};

use crate::domain::{
    ApiKey, Balance, Deposit, DepositId, Inquiry, InquiryId, LedgerEntry, Order, OrderId, User,
    UserId, Voucher, WebhookEvent,
};
use crate::error::RepoError;

/// A unit of work holding the balance lock of one user.
///
/// Lock order is always the balance first, then the order or deposit row.
/// Dropping a `LedgerTx` without calling [`LedgerTx::commit`] rolls it back.
#[async_trait::async_trait]
pub trait LedgerTx: Send {
    /// Exclusive lock on the user's balance row for the rest of the unit of work.
    /// Returns `RepoError::NotFound` if the user has no ledger row.
    async fn lock_balance(&mut self, user_id: UserId) -> Result<Balance, RepoError>;

    /// Writes the balance back; refreshes `updated_at`.
    async fn persist_balance(&mut self, balance: &mut Balance) -> Result<(), RepoError>;

    async fn lock_order(&mut self, id: OrderId) -> Result<Order, RepoError>;

    async fn persist_order(&mut self, order: &Order) -> Result<(), RepoError>;

    async fn lock_deposit(&mut self, id: DepositId) -> Result<Deposit, RepoError>;

    async fn persist_deposit(&mut self, deposit: &Deposit) -> Result<(), RepoError>;

    async fn append_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), RepoError>;

    async fn commit(&mut self) -> Result<(), RepoError>;

    async fn rollback(&mut self) -> Result<(), RepoError>;
}

/// The main repository port for the settlement engine.
///
/// Plain reads and inserts go through this trait directly. Every balance
/// mutation goes through a [`LedgerTx`] obtained from [`SettlementRepository::begin`].
#[async_trait::async_trait]
pub trait SettlementRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────
    // Users & balances
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the user and its zero balance row atomically.
    async fn create_user(&self, user: &User) -> Result<Balance, RepoError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError>;

    async fn get_balance(&self, user_id: UserId) -> Result<Option<Balance>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Inquiries
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_inquiry(&self, inquiry: &Inquiry) -> Result<(), RepoError>;

    async fn find_inquiry(
        &self,
        user_id: UserId,
        id: InquiryId,
    ) -> Result<Option<Inquiry>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Orders
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a new order. Returns `RepoError::Conflict` when an order for
    /// the same inquiry already exists.
    async fn create_order(&self, order: &Order) -> Result<(), RepoError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepoError>;

    async fn find_order_by_inquiry(&self, inquiry_id: InquiryId)
    -> Result<Option<Order>, RepoError>;

    /// A reference shared by several orders is `Conflict`.
    async fn find_order_by_reference(&self, reference: &str) -> Result<Option<Order>, RepoError>;

    /// Newest first.
    async fn list_orders(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, RepoError>;

    /// `PendingPayment` orders whose deadline is at or before `now`.
    async fn list_expired_pending_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, RepoError>;

    /// `Processing` orders last touched before `cutoff`.
    async fn list_stuck_processing_orders(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Deposits
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_deposit(&self, deposit: &Deposit) -> Result<(), RepoError>;

    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, RepoError>;

    /// A reference shared by several deposits is `Conflict`.
    async fn find_deposit_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Deposit>, RepoError>;

    async fn list_expired_pending_deposits(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Deposit>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger, vouchers, webhook inbox
    // ─────────────────────────────────────────────────────────────────────────

    /// Oldest first, so the before/after chain can be verified.
    async fn list_ledger_entries(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, RepoError>;

    /// Returns `RepoError::Conflict` for a duplicate code.
    async fn create_voucher(&self, voucher: &Voucher) -> Result<(), RepoError>;

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, RepoError>;

    async fn record_webhook(&self, event: &WebhookEvent) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Units of work
    // ─────────────────────────────────────────────────────────────────────────

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────
    // API Key Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Verifies an API key hash and returns the key if valid and active.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    /// Creates a new API key. Returns the key record and the raw key (shown once).
    async fn create_api_key(
        &self,
        name: &str,
        user_id: Option<UserId>,
    ) -> Result<(ApiKey, String), RepoError>;

    /// Counts active API keys.
    async fn count_api_keys(&self) -> Result<i64, RepoError>;
}
