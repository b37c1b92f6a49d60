//! SQLite repository adapter.
//!
//! SQLite has no row locks. A process-wide writer gate serialises every write
//! and is held by a [`SqliteLedgerTx`] for its whole lifetime, which makes
//! `lock_balance` exclusive for the unit of work.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use settlement_types::{
    ApiKey, Balance, Deposit, DepositId, Inquiry, InquiryId, LedgerEntry, LedgerTx, Order,
    OrderId, RepoError, SettlementRepository, User, UserId, Voucher, WebhookEvent,
};

use crate::types::{
    DEPOSIT_COLUMNS, DbApiKey, DbBalance, DbDeposit, DbInquiry, DbLedgerEntry, DbOrder, DbUser,
    DbVoucher, ORDER_COLUMNS, generate_api_key, json_to_db, map_insert_err, time_to_db,
    uuid_to_db,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database,
        // so the pool must keep exactly one connection alive forever.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(crate::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .acquire_timeout(crate::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        };

        let repo = Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for ddl in [
            include_str!("../migrations/0001_create_tables.sql"),
            include_str!("../migrations/0002_create_webhook_events.sql"),
            include_str!("../migrations/0003_create_api_keys.sql"),
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

/// A SQLite transaction plus the writer gate.
///
/// Field order matters: the transaction is dropped (rolled back) before the
/// gate is released.
pub struct SqliteLedgerTx {
    tx: Option<Transaction<'static, Sqlite>>,
    _gate: OwnedMutexGuard<()>,
}

impl SqliteLedgerTx {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, RepoError> {
        self.tx
            .as_mut()
            .ok_or_else(|| RepoError::Transaction("Unit of work already finished".into()))
    }
}

#[async_trait]
impl LedgerTx for SqliteLedgerTx {
    async fn lock_balance(&mut self, user_id: UserId) -> Result<Balance, RepoError> {
        let tx = self.tx()?;
        let row: Option<DbBalance> = sqlx::query_as(
            r#"SELECT user_id, amount, pending_amount, updated_at FROM balances WHERE user_id = ?"#,
        )
        .bind(uuid_to_db(user_id.into_uuid()))
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn persist_balance(&mut self, balance: &mut Balance) -> Result<(), RepoError> {
        balance.updated_at = Utc::now();
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"UPDATE balances SET amount = ?, pending_amount = ?, updated_at = ? WHERE user_id = ?"#,
        )
        .bind(balance.amount.amount())
        .bind(balance.pending_amount.amount())
        .bind(time_to_db(balance.updated_at))
        .bind(uuid_to_db(balance.user_id.into_uuid()))
        .execute(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Order, RepoError> {
        let tx = self.tx()?;
        let row: Option<DbOrder> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
                .bind(uuid_to_db(id.into_uuid()))
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn persist_order(&mut self, order: &Order) -> Result<(), RepoError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"UPDATE orders
               SET status = ?, balance_before = ?, balance_after = ?, external_reference_id = ?,
                   serial_number = ?, failure_reason = ?, updated_at = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(order.status.as_str())
        .bind(order.balance_before.map(|m| m.amount()))
        .bind(order.balance_after.map(|m| m.amount()))
        .bind(&order.external_reference_id)
        .bind(&order.serial_number)
        .bind(&order.failure_reason)
        .bind(time_to_db(order.updated_at))
        .bind(order.completed_at.map(time_to_db))
        .bind(uuid_to_db(order.id.into_uuid()))
        .execute(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn lock_deposit(&mut self, id: DepositId) -> Result<Deposit, RepoError> {
        let tx = self.tx()?;
        let row: Option<DbDeposit> =
            sqlx::query_as(&format!("SELECT {} FROM deposits WHERE id = ?", DEPOSIT_COLUMNS))
                .bind(uuid_to_db(id.into_uuid()))
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn persist_deposit(&mut self, deposit: &Deposit) -> Result<(), RepoError> {
        let instructions = deposit.instructions.as_ref().map(json_to_db).transpose()?;
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"UPDATE deposits
               SET status = ?, fee = ?, external_reference_id = ?, instructions = ?,
                   balance_before = ?, balance_after = ?, updated_at = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(deposit.status.as_str())
        .bind(deposit.fee.amount())
        .bind(&deposit.external_reference_id)
        .bind(instructions)
        .bind(deposit.balance_before.map(|m| m.amount()))
        .bind(deposit.balance_after.map(|m| m.amount()))
        .bind(time_to_db(deposit.updated_at))
        .bind(deposit.completed_at.map(time_to_db))
        .bind(uuid_to_db(deposit.id.into_uuid()))
        .execute(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn append_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), RepoError> {
        let tx = self.tx()?;
        let user_id = uuid_to_db(entry.user_id.into_uuid());
        sqlx::query(
            r#"INSERT INTO ledger_entries
               (id, user_id, kind, amount, balance_before, balance_after, order_id, deposit_id, seq, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                       (SELECT COALESCE(MAX(seq), 0) + 1 FROM ledger_entries WHERE user_id = ?), ?)"#,
        )
        .bind(uuid_to_db(entry.id.into_uuid()))
        .bind(&user_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount.amount())
        .bind(entry.balance_before.amount())
        .bind(entry.balance_after.amount())
        .bind(entry.order_id.map(|id| uuid_to_db(id.into_uuid())))
        .bind(entry.deposit_id.map(|id| uuid_to_db(id.into_uuid())))
        .bind(&user_id)
        .bind(time_to_db(entry.created_at))
        .execute(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RepoError::Transaction("Unit of work already finished".into()))?;
        tx.commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))
    }

    async fn rollback(&mut self) -> Result<(), RepoError> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| RepoError::Transaction(e.to_string())),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SettlementRepository for SqliteRepo {
    async fn create_user(&self, user: &User) -> Result<Balance, RepoError> {
        let _gate = self.write_gate.lock().await;
        let id = uuid_to_db(user.id.into_uuid());
        let now = Utc::now();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(r#"INSERT INTO users (id, pin_hash, created_at) VALUES (?, ?, ?)"#)
            .bind(&id)
            .bind(&user.pin_hash)
            .bind(time_to_db(user.created_at))
            .execute(&mut *db_tx)
            .await
            .map_err(|e| map_insert_err(e, "User"))?;

        sqlx::query(
            r#"INSERT INTO balances (user_id, amount, pending_amount, updated_at) VALUES (?, 0, 0, ?)"#,
        )
        .bind(&id)
        .bind(time_to_db(now))
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let mut balance = Balance::new(user.id);
        balance.updated_at = now;
        Ok(balance)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError> {
        let row: Option<DbUser> =
            sqlx::query_as(r#"SELECT id, pin_hash, created_at FROM users WHERE id = ?"#)
                .bind(uuid_to_db(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbUser::into_domain).transpose()
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Option<Balance>, RepoError> {
        let row: Option<DbBalance> = sqlx::query_as(
            r#"SELECT user_id, amount, pending_amount, updated_at FROM balances WHERE user_id = ?"#,
        )
        .bind(uuid_to_db(user_id.into_uuid()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbBalance::into_domain).transpose()
    }

    async fn create_inquiry(&self, inquiry: &Inquiry) -> Result<(), RepoError> {
        let _gate = self.write_gate.lock().await;
        sqlx::query(
            r#"INSERT INTO inquiries
               (id, user_id, target, amount, fee, customer_name, external_reference_id, expires_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(uuid_to_db(inquiry.id.into_uuid()))
        .bind(uuid_to_db(inquiry.user_id.into_uuid()))
        .bind(json_to_db(&inquiry.target)?)
        .bind(inquiry.amount.amount())
        .bind(inquiry.fee.amount())
        .bind(&inquiry.customer_name)
        .bind(&inquiry.external_reference_id)
        .bind(time_to_db(inquiry.expires_at))
        .bind(time_to_db(inquiry.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Inquiry"))?;

        Ok(())
    }

    async fn find_inquiry(
        &self,
        user_id: UserId,
        id: InquiryId,
    ) -> Result<Option<Inquiry>, RepoError> {
        let row: Option<DbInquiry> = sqlx::query_as(
            r#"SELECT id, user_id, target, amount, fee, customer_name, external_reference_id, expires_at, created_at
               FROM inquiries WHERE id = ? AND user_id = ?"#,
        )
        .bind(uuid_to_db(id.into_uuid()))
        .bind(uuid_to_db(user_id.into_uuid()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbInquiry::into_domain).transpose()
    }

    async fn create_order(&self, order: &Order) -> Result<(), RepoError> {
        let _gate = self.write_gate.lock().await;
        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ORDER_COLUMNS
        ))
        .bind(uuid_to_db(order.id.into_uuid()))
        .bind(uuid_to_db(order.user_id.into_uuid()))
        .bind(uuid_to_db(order.inquiry_id.into_uuid()))
        .bind(order.kind.as_str())
        .bind(json_to_db(&order.target)?)
        .bind(order.status.as_str())
        .bind(order.amount.amount())
        .bind(order.fee.amount())
        .bind(order.discount.amount())
        .bind(order.total_payment.amount())
        .bind(order.balance_before.map(|m| m.amount()))
        .bind(order.balance_after.map(|m| m.amount()))
        .bind(&order.external_reference_id)
        .bind(&order.serial_number)
        .bind(&order.failure_reason)
        .bind(&order.voucher_code)
        .bind(time_to_db(order.expires_at))
        .bind(time_to_db(order.created_at))
        .bind(time_to_db(order.updated_at))
        .bind(order.completed_at.map(time_to_db))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Order for this inquiry"))?;

        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepoError> {
        let row: Option<DbOrder> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
                .bind(uuid_to_db(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbOrder::into_domain).transpose()
    }

    async fn find_order_by_inquiry(
        &self,
        inquiry_id: InquiryId,
    ) -> Result<Option<Order>, RepoError> {
        let row: Option<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE inquiry_id = ?",
            ORDER_COLUMNS
        ))
        .bind(uuid_to_db(inquiry_id.into_uuid()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbOrder::into_domain).transpose()
    }

    async fn find_order_by_reference(&self, reference: &str) -> Result<Option<Order>, RepoError> {
        let mut rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE external_reference_id = ? LIMIT 2",
            ORDER_COLUMNS
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if rows.len() > 1 {
            return Err(RepoError::Conflict(format!(
                "reference {} matches several orders",
                reference
            )));
        }
        rows.pop().map(DbOrder::into_domain).transpose()
    }

    async fn list_orders(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
            ORDER_COLUMNS
        ))
        .bind(uuid_to_db(user_id.into_uuid()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbOrder::into_domain).collect()
    }

    async fn list_expired_pending_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = 'PENDING_PAYMENT' AND expires_at <= ? ORDER BY expires_at ASC LIMIT ?",
            ORDER_COLUMNS
        ))
        .bind(time_to_db(now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbOrder::into_domain).collect()
    }

    async fn list_stuck_processing_orders(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = 'PROCESSING' AND updated_at < ? ORDER BY updated_at ASC LIMIT ?",
            ORDER_COLUMNS
        ))
        .bind(time_to_db(cutoff))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbOrder::into_domain).collect()
    }

    async fn create_deposit(&self, deposit: &Deposit) -> Result<(), RepoError> {
        let _gate = self.write_gate.lock().await;
        let instructions = deposit.instructions.as_ref().map(json_to_db).transpose()?;
        sqlx::query(&format!(
            "INSERT INTO deposits ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            DEPOSIT_COLUMNS
        ))
        .bind(uuid_to_db(deposit.id.into_uuid()))
        .bind(uuid_to_db(deposit.user_id.into_uuid()))
        .bind(json_to_db(&deposit.method)?)
        .bind(deposit.amount.amount())
        .bind(deposit.fee.amount())
        .bind(deposit.status.as_str())
        .bind(&deposit.external_reference_id)
        .bind(instructions)
        .bind(deposit.balance_before.map(|m| m.amount()))
        .bind(deposit.balance_after.map(|m| m.amount()))
        .bind(time_to_db(deposit.expires_at))
        .bind(time_to_db(deposit.created_at))
        .bind(time_to_db(deposit.updated_at))
        .bind(deposit.completed_at.map(time_to_db))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Deposit"))?;

        Ok(())
    }

    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, RepoError> {
        let row: Option<DbDeposit> =
            sqlx::query_as(&format!("SELECT {} FROM deposits WHERE id = ?", DEPOSIT_COLUMNS))
                .bind(uuid_to_db(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbDeposit::into_domain).transpose()
    }

    async fn find_deposit_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Deposit>, RepoError> {
        let mut rows: Vec<DbDeposit> = sqlx::query_as(&format!(
            "SELECT {} FROM deposits WHERE external_reference_id = ? LIMIT 2",
            DEPOSIT_COLUMNS
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if rows.len() > 1 {
            return Err(RepoError::Conflict(format!(
                "reference {} matches several deposits",
                reference
            )));
        }
        rows.pop().map(DbDeposit::into_domain).transpose()
    }

    async fn list_expired_pending_deposits(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Deposit>, RepoError> {
        let rows: Vec<DbDeposit> = sqlx::query_as(&format!(
            "SELECT {} FROM deposits WHERE status = 'PENDING' AND expires_at <= ? ORDER BY expires_at ASC LIMIT ?",
            DEPOSIT_COLUMNS
        ))
        .bind(time_to_db(now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbDeposit::into_domain).collect()
    }

    async fn list_ledger_entries(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, RepoError> {
        let rows: Vec<DbLedgerEntry> = sqlx::query_as(
            r#"SELECT id, user_id, kind, amount, balance_before, balance_after, order_id, deposit_id, created_at
               FROM ledger_entries WHERE user_id = ? ORDER BY seq ASC LIMIT ? OFFSET ?"#,
        )
        .bind(uuid_to_db(user_id.into_uuid()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbLedgerEntry::into_domain).collect()
    }

    async fn create_voucher(&self, voucher: &Voucher) -> Result<(), RepoError> {
        let _gate = self.write_gate.lock().await;
        sqlx::query(
            r#"INSERT INTO vouchers (code, discount, min_amount, valid_until, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&voucher.code)
        .bind(voucher.discount.amount())
        .bind(voucher.min_amount.amount())
        .bind(time_to_db(voucher.valid_until))
        .bind(voucher.is_active)
        .bind(time_to_db(voucher.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Voucher"))?;

        Ok(())
    }

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, RepoError> {
        let row: Option<DbVoucher> = sqlx::query_as(
            r#"SELECT code, discount, min_amount, valid_until, is_active, created_at
               FROM vouchers WHERE code = ?"#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbVoucher::into_domain).transpose()
    }

    async fn record_webhook(&self, event: &WebhookEvent) -> Result<(), RepoError> {
        let _gate = self.write_gate.lock().await;
        sqlx::query(
            r#"INSERT INTO webhook_events (id, reference_id, provider_status, payload, disposition, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(uuid_to_db(event.id))
        .bind(&event.reference_id)
        .bind(event.provider_status.as_str())
        .bind(json_to_db(&event.payload)?)
        .bind(event.disposition.as_str())
        .bind(time_to_db(event.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, RepoError> {
        let gate = self.write_gate.clone().lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(Box::new(SqliteLedgerTx {
            tx: Some(tx),
            _gate: gate,
        }))
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let row: Option<DbApiKey> = sqlx::query_as(
            r#"
            SELECT id, name, key_hash, user_id, is_active, created_at, last_used_at
            FROM api_keys
            WHERE key_hash = ? AND is_active = 1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbApiKey::into_domain).transpose()
    }

    async fn create_api_key(
        &self,
        name: &str,
        user_id: Option<UserId>,
    ) -> Result<(ApiKey, String), RepoError> {
        let raw_key = generate_api_key();
        let api_key = ApiKey::new(
            name.to_string(),
            crate::security::hash_api_key(&raw_key),
            user_id,
        );

        let _gate = self.write_gate.lock().await;
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, key_hash, user_id, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(uuid_to_db(api_key.id.into_uuid()))
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(user_id.map(|id| uuid_to_db(id.into_uuid())))
        .bind(time_to_db(api_key.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }
}
