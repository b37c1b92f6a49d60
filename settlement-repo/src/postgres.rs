//! PostgreSQL repository adapter.
//!
//! Balance, order and deposit rows are locked with `SELECT ... FOR UPDATE`,
//! so units of work for different users run in parallel.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use settlement_types::{
    ApiKey, Balance, Deposit, DepositId, Inquiry, InquiryId, LedgerEntry, LedgerTx, Order,
    OrderId, RepoError, SettlementRepository, User, UserId, Voucher, WebhookEvent,
};

use crate::types::{
    DEPOSIT_COLUMNS, DbApiKey, DbBalance, DbDeposit, DbInquiry, DbLedgerEntry, DbOrder, DbUser,
    DbVoucher, ORDER_COLUMNS, generate_api_key, json_to_db, map_insert_err,
};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_tables_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_webhook_events_pg.sql"),
        "0002",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0003_create_api_keys_pg.sql"),
        "0003",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(crate::ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

pub struct PgLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTx {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, RepoError> {
        self.tx
            .as_mut()
            .ok_or_else(|| RepoError::Transaction("Unit of work already finished".into()))
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_balance(&mut self, user_id: UserId) -> Result<Balance, RepoError> {
        let tx = self.tx()?;
        let row: Option<DbBalance> = sqlx::query_as(
            r#"SELECT user_id, amount, pending_amount, updated_at FROM balances WHERE user_id = $1 FOR UPDATE"#,
        )
        .bind(user_id.into_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn persist_balance(&mut self, balance: &mut Balance) -> Result<(), RepoError> {
        balance.updated_at = Utc::now();
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"UPDATE balances SET amount = $1, pending_amount = $2, updated_at = $3 WHERE user_id = $4"#,
        )
        .bind(balance.amount.amount())
        .bind(balance.pending_amount.amount())
        .bind(balance.updated_at)
        .bind(balance.user_id.into_uuid())
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
        let row: Option<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn persist_order(&mut self, order: &Order) -> Result<(), RepoError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"UPDATE orders
               SET status = $1, balance_before = $2, balance_after = $3, external_reference_id = $4,
                   serial_number = $5, failure_reason = $6, updated_at = $7, completed_at = $8
               WHERE id = $9"#,
        )
        .bind(order.status.as_str())
        .bind(order.balance_before.map(|m| m.amount()))
        .bind(order.balance_after.map(|m| m.amount()))
        .bind(&order.external_reference_id)
        .bind(&order.serial_number)
        .bind(&order.failure_reason)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .bind(order.id.into_uuid())
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
        let row: Option<DbDeposit> = sqlx::query_as(&format!(
            "SELECT {} FROM deposits WHERE id = $1 FOR UPDATE",
            DEPOSIT_COLUMNS
        ))
        .bind(id.into_uuid())
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
               SET status = $1, fee = $2, external_reference_id = $3, instructions = $4,
                   balance_before = $5, balance_after = $6, updated_at = $7, completed_at = $8
               WHERE id = $9"#,
        )
        .bind(deposit.status.as_str())
        .bind(deposit.fee.amount())
        .bind(&deposit.external_reference_id)
        .bind(instructions)
        .bind(deposit.balance_before.map(|m| m.amount()))
        .bind(deposit.balance_after.map(|m| m.amount()))
        .bind(deposit.updated_at)
        .bind(deposit.completed_at)
        .bind(deposit.id.into_uuid())
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
        sqlx::query(
            r#"INSERT INTO ledger_entries
               (id, user_id, kind, amount, balance_before, balance_after, order_id, deposit_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(entry.id.into_uuid())
        .bind(entry.user_id.into_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.amount.amount())
        .bind(entry.balance_before.amount())
        .bind(entry.balance_after.amount())
        .bind(entry.order_id.map(|id| id.into_uuid()))
        .bind(entry.deposit_id.map(|id| id.into_uuid()))
        .bind(entry.created_at)
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
impl SettlementRepository for PostgresRepo {
    async fn create_user(&self, user: &User) -> Result<Balance, RepoError> {
        let now = Utc::now();
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(r#"INSERT INTO users (id, pin_hash, created_at) VALUES ($1, $2, $3)"#)
            .bind(user.id.into_uuid())
            .bind(&user.pin_hash)
            .bind(user.created_at)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| map_insert_err(e, "User"))?;

        sqlx::query(
            r#"INSERT INTO balances (user_id, amount, pending_amount, updated_at) VALUES ($1, 0, 0, $2)"#,
        )
        .bind(user.id.into_uuid())
        .bind(now)
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
            sqlx::query_as(r#"SELECT id, pin_hash, created_at FROM users WHERE id = $1"#)
                .bind(id.into_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbUser::into_domain).transpose()
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Option<Balance>, RepoError> {
        let row: Option<DbBalance> = sqlx::query_as(
            r#"SELECT user_id, amount, pending_amount, updated_at FROM balances WHERE user_id = $1"#,
        )
        .bind(user_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbBalance::into_domain).transpose()
    }

    async fn create_inquiry(&self, inquiry: &Inquiry) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO inquiries
               (id, user_id, target, amount, fee, customer_name, external_reference_id, expires_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(inquiry.id.into_uuid())
        .bind(inquiry.user_id.into_uuid())
        .bind(json_to_db(&inquiry.target)?)
        .bind(inquiry.amount.amount())
        .bind(inquiry.fee.amount())
        .bind(&inquiry.customer_name)
        .bind(&inquiry.external_reference_id)
        .bind(inquiry.expires_at)
        .bind(inquiry.created_at)
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
               FROM inquiries WHERE id = $1 AND user_id = $2"#,
        )
        .bind(id.into_uuid())
        .bind(user_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbInquiry::into_domain).transpose()
    }

    async fn create_order(&self, order: &Order) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            ORDER_COLUMNS
        ))
        .bind(order.id.into_uuid())
        .bind(order.user_id.into_uuid())
        .bind(order.inquiry_id.into_uuid())
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
        .bind(order.expires_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Order for this inquiry"))?;

        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepoError> {
        let row: Option<DbOrder> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                .bind(id.into_uuid())
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
            "SELECT {} FROM orders WHERE inquiry_id = $1",
            ORDER_COLUMNS
        ))
        .bind(inquiry_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbOrder::into_domain).transpose()
    }

    async fn find_order_by_reference(&self, reference: &str) -> Result<Option<Order>, RepoError> {
        let mut rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE external_reference_id = $1 LIMIT 2",
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
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            ORDER_COLUMNS
        ))
        .bind(user_id.into_uuid())
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
            "SELECT {} FROM orders WHERE status = 'PENDING_PAYMENT' AND expires_at <= $1 ORDER BY expires_at ASC LIMIT $2",
            ORDER_COLUMNS
        ))
        .bind(now)
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
            "SELECT {} FROM orders WHERE status = 'PROCESSING' AND updated_at < $1 ORDER BY updated_at ASC LIMIT $2",
            ORDER_COLUMNS
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbOrder::into_domain).collect()
    }

    async fn create_deposit(&self, deposit: &Deposit) -> Result<(), RepoError> {
        let instructions = deposit.instructions.as_ref().map(json_to_db).transpose()?;
        sqlx::query(&format!(
            "INSERT INTO deposits ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            DEPOSIT_COLUMNS
        ))
        .bind(deposit.id.into_uuid())
        .bind(deposit.user_id.into_uuid())
        .bind(json_to_db(&deposit.method)?)
        .bind(deposit.amount.amount())
        .bind(deposit.fee.amount())
        .bind(deposit.status.as_str())
        .bind(&deposit.external_reference_id)
        .bind(instructions)
        .bind(deposit.balance_before.map(|m| m.amount()))
        .bind(deposit.balance_after.map(|m| m.amount()))
        .bind(deposit.expires_at)
        .bind(deposit.created_at)
        .bind(deposit.updated_at)
        .bind(deposit.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Deposit"))?;

        Ok(())
    }

    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, RepoError> {
        let row: Option<DbDeposit> = sqlx::query_as(&format!(
            "SELECT {} FROM deposits WHERE id = $1",
            DEPOSIT_COLUMNS
        ))
        .bind(id.into_uuid())
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
            "SELECT {} FROM deposits WHERE external_reference_id = $1 LIMIT 2",
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
            "SELECT {} FROM deposits WHERE status = 'PENDING' AND expires_at <= $1 ORDER BY expires_at ASC LIMIT $2",
            DEPOSIT_COLUMNS
        ))
        .bind(now)
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
               FROM ledger_entries WHERE user_id = $1 ORDER BY seq ASC LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id.into_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbLedgerEntry::into_domain).collect()
    }

    async fn create_voucher(&self, voucher: &Voucher) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO vouchers (code, discount, min_amount, valid_until, is_active, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&voucher.code)
        .bind(voucher.discount.amount())
        .bind(voucher.min_amount.amount())
        .bind(voucher.valid_until)
        .bind(voucher.is_active)
        .bind(voucher.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "Voucher"))?;

        Ok(())
    }

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, RepoError> {
        let row: Option<DbVoucher> = sqlx::query_as(
            r#"SELECT code, discount, min_amount, valid_until, is_active, created_at
               FROM vouchers WHERE code = $1"#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbVoucher::into_domain).transpose()
    }

    async fn record_webhook(&self, event: &WebhookEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO webhook_events (id, reference_id, provider_status, payload, disposition, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(event.id)
        .bind(&event.reference_id)
        .bind(event.provider_status.as_str())
        .bind(&event.payload)
        .bind(event.disposition.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, RepoError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(Box::new(PgLedgerTx { tx: Some(tx) }))
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let row: Option<DbApiKey> = sqlx::query_as(
            r#"
            UPDATE api_keys SET last_used_at = NOW()
            WHERE key_hash = $1 AND is_active = TRUE
            RETURNING id, name, key_hash, user_id, is_active, created_at, last_used_at
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

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, key_hash, user_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            "#,
        )
        .bind(api_key.id.into_uuid())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(user_id.map(|id| id.into_uuid()))
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }
}
