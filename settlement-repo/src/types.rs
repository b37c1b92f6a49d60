//! Shared database row types.
//!
//! PostgreSQL stores native UUID / TIMESTAMPTZ / JSONB columns, SQLite stores
//! TEXT. The `Db*` aliases pick the column representation per backend so each
//! row struct and its `into_domain` conversion is written once.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::FromRow;
use uuid::Uuid;

use settlement_types::{
    ApiKey, ApiKeyId, Balance, Deposit, DepositId, Inquiry, InquiryId, LedgerEntry, LedgerEntryId,
    Money, Order, OrderId, RepoError, User, UserId, Voucher,
};

// ─────────────────────────────────────────────────────────────────────────────
// Feature-gated column representations
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
pub type DbUuid = Uuid;
#[cfg(not(feature = "postgres"))]
pub type DbUuid = String;

#[cfg(feature = "postgres")]
pub type DbTime = DateTime<Utc>;
#[cfg(not(feature = "postgres"))]
pub type DbTime = String;

#[cfg(feature = "postgres")]
pub type DbJson = serde_json::Value;
#[cfg(not(feature = "postgres"))]
pub type DbJson = String;

// ─────────────────────────────────────────────────────────────────────────────
// Conversion helpers
// ─────────────────────────────────────────────────────────────────────────────

fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::Database(e.to_string())
}

#[cfg(feature = "postgres")]
pub fn uuid_from_db(v: DbUuid) -> Result<Uuid, RepoError> {
    Ok(v)
}
#[cfg(not(feature = "postgres"))]
pub fn uuid_from_db(v: DbUuid) -> Result<Uuid, RepoError> {
    Uuid::parse_str(&v).map_err(db_err)
}

#[cfg(feature = "postgres")]
pub fn uuid_to_db(v: Uuid) -> DbUuid {
    v
}
#[cfg(not(feature = "postgres"))]
pub fn uuid_to_db(v: Uuid) -> DbUuid {
    v.to_string()
}

#[cfg(feature = "postgres")]
pub fn time_from_db(v: DbTime) -> Result<DateTime<Utc>, RepoError> {
    Ok(v)
}
#[cfg(not(feature = "postgres"))]
pub fn time_from_db(v: DbTime) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(&v)
        .map_err(db_err)?
        .with_timezone(&Utc))
}

/// RFC 3339 with a fixed fraction width so TEXT comparison orders correctly.
#[cfg(feature = "postgres")]
pub fn time_to_db(v: DateTime<Utc>) -> DbTime {
    v
}
#[cfg(not(feature = "postgres"))]
pub fn time_to_db(v: DateTime<Utc>) -> DbTime {
    v.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(feature = "postgres")]
pub fn json_from_db<T: DeserializeOwned>(v: DbJson) -> Result<T, RepoError> {
    serde_json::from_value(v).map_err(db_err)
}
#[cfg(not(feature = "postgres"))]
pub fn json_from_db<T: DeserializeOwned>(v: DbJson) -> Result<T, RepoError> {
    serde_json::from_str(&v).map_err(db_err)
}

#[cfg(feature = "postgres")]
pub fn json_to_db<T: Serialize>(v: &T) -> Result<DbJson, RepoError> {
    serde_json::to_value(v).map_err(db_err)
}
#[cfg(not(feature = "postgres"))]
pub fn json_to_db<T: Serialize>(v: &T) -> Result<DbJson, RepoError> {
    serde_json::to_string(v).map_err(db_err)
}

fn money(v: i64) -> Result<Money, RepoError> {
    Money::new(v).map_err(RepoError::Domain)
}

fn opt_money(v: Option<i64>) -> Result<Option<Money>, RepoError> {
    v.map(money).transpose()
}

fn opt_time(v: Option<DbTime>) -> Result<Option<DateTime<Utc>>, RepoError> {
    v.map(time_from_db).transpose()
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, RepoError> {
    s.parse().map_err(RepoError::Database)
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbUser {
    pub id: DbUuid,
    pub pin_hash: String,
    pub created_at: DbTime,
}

impl DbUser {
    pub fn into_domain(self) -> Result<User, RepoError> {
        Ok(User {
            id: UserId::from_uuid(uuid_from_db(self.id)?),
            pin_hash: self.pin_hash,
            created_at: time_from_db(self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbBalance {
    pub user_id: DbUuid,
    pub amount: i64,
    pub pending_amount: i64,
    pub updated_at: DbTime,
}

impl DbBalance {
    pub fn into_domain(self) -> Result<Balance, RepoError> {
        Ok(Balance::from_parts(
            UserId::from_uuid(uuid_from_db(self.user_id)?),
            money(self.amount)?,
            money(self.pending_amount)?,
            time_from_db(self.updated_at)?,
        ))
    }
}

#[derive(FromRow)]
pub struct DbInquiry {
    pub id: DbUuid,
    pub user_id: DbUuid,
    pub target: DbJson,
    pub amount: i64,
    pub fee: i64,
    pub customer_name: Option<String>,
    pub external_reference_id: String,
    pub expires_at: DbTime,
    pub created_at: DbTime,
}

impl DbInquiry {
    pub fn into_domain(self) -> Result<Inquiry, RepoError> {
        Ok(Inquiry {
            id: InquiryId::from_uuid(uuid_from_db(self.id)?),
            user_id: UserId::from_uuid(uuid_from_db(self.user_id)?),
            target: json_from_db(self.target)?,
            amount: money(self.amount)?,
            fee: money(self.fee)?,
            customer_name: self.customer_name,
            external_reference_id: self.external_reference_id,
            expires_at: time_from_db(self.expires_at)?,
            created_at: time_from_db(self.created_at)?,
        })
    }
}

pub const ORDER_COLUMNS: &str = "id, user_id, inquiry_id, kind, target, status, amount, fee, \
     discount, total_payment, balance_before, balance_after, external_reference_id, \
     serial_number, failure_reason, voucher_code, expires_at, created_at, updated_at, completed_at";

#[derive(FromRow)]
pub struct DbOrder {
    pub id: DbUuid,
    pub user_id: DbUuid,
    pub inquiry_id: DbUuid,
    pub kind: String,
    pub target: DbJson,
    pub status: String,
    pub amount: i64,
    pub fee: i64,
    pub discount: i64,
    pub total_payment: i64,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    pub external_reference_id: String,
    pub serial_number: Option<String>,
    pub failure_reason: Option<String>,
    pub voucher_code: Option<String>,
    pub expires_at: DbTime,
    pub created_at: DbTime,
    pub updated_at: DbTime,
    pub completed_at: Option<DbTime>,
}

impl DbOrder {
    pub fn into_domain(self) -> Result<Order, RepoError> {
        Ok(Order {
            id: OrderId::from_uuid(uuid_from_db(self.id)?),
            user_id: UserId::from_uuid(uuid_from_db(self.user_id)?),
            inquiry_id: InquiryId::from_uuid(uuid_from_db(self.inquiry_id)?),
            kind: parse_enum(&self.kind)?,
            target: json_from_db(self.target)?,
            status: parse_enum(&self.status)?,
            amount: money(self.amount)?,
            fee: money(self.fee)?,
            discount: money(self.discount)?,
            total_payment: money(self.total_payment)?,
            balance_before: opt_money(self.balance_before)?,
            balance_after: opt_money(self.balance_after)?,
            external_reference_id: self.external_reference_id,
            serial_number: self.serial_number,
            failure_reason: self.failure_reason,
            voucher_code: self.voucher_code,
            expires_at: time_from_db(self.expires_at)?,
            created_at: time_from_db(self.created_at)?,
            updated_at: time_from_db(self.updated_at)?,
            completed_at: opt_time(self.completed_at)?,
        })
    }
}

pub const DEPOSIT_COLUMNS: &str = "id, user_id, method, amount, fee, status, \
     external_reference_id, instructions, balance_before, balance_after, expires_at, \
     created_at, updated_at, completed_at";

#[derive(FromRow)]
pub struct DbDeposit {
    pub id: DbUuid,
    pub user_id: DbUuid,
    pub method: DbJson,
    pub amount: i64,
    pub fee: i64,
    pub status: String,
    pub external_reference_id: Option<String>,
    pub instructions: Option<DbJson>,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    pub expires_at: DbTime,
    pub created_at: DbTime,
    pub updated_at: DbTime,
    pub completed_at: Option<DbTime>,
}

impl DbDeposit {
    pub fn into_domain(self) -> Result<Deposit, RepoError> {
        Ok(Deposit {
            id: DepositId::from_uuid(uuid_from_db(self.id)?),
            user_id: UserId::from_uuid(uuid_from_db(self.user_id)?),
            method: json_from_db(self.method)?,
            amount: money(self.amount)?,
            fee: money(self.fee)?,
            status: parse_enum(&self.status)?,
            external_reference_id: self.external_reference_id,
            instructions: self.instructions.map(json_from_db).transpose()?,
            balance_before: opt_money(self.balance_before)?,
            balance_after: opt_money(self.balance_after)?,
            expires_at: time_from_db(self.expires_at)?,
            created_at: time_from_db(self.created_at)?,
            updated_at: time_from_db(self.updated_at)?,
            completed_at: opt_time(self.completed_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbLedgerEntry {
    pub id: DbUuid,
    pub user_id: DbUuid,
    pub kind: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub order_id: Option<DbUuid>,
    pub deposit_id: Option<DbUuid>,
    pub created_at: DbTime,
}

impl DbLedgerEntry {
    pub fn into_domain(self) -> Result<LedgerEntry, RepoError> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(uuid_from_db(self.id)?),
            user_id: UserId::from_uuid(uuid_from_db(self.user_id)?),
            kind: parse_enum(&self.kind)?,
            amount: money(self.amount)?,
            balance_before: money(self.balance_before)?,
            balance_after: money(self.balance_after)?,
            order_id: self
                .order_id
                .map(uuid_from_db)
                .transpose()?
                .map(OrderId::from_uuid),
            deposit_id: self
                .deposit_id
                .map(uuid_from_db)
                .transpose()?
                .map(DepositId::from_uuid),
            created_at: time_from_db(self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbVoucher {
    pub code: String,
    pub discount: i64,
    pub min_amount: i64,
    pub valid_until: DbTime,
    pub is_active: bool,
    pub created_at: DbTime,
}

impl DbVoucher {
    pub fn into_domain(self) -> Result<Voucher, RepoError> {
        Ok(Voucher {
            code: self.code,
            discount: money(self.discount)?,
            min_amount: money(self.min_amount)?,
            valid_until: time_from_db(self.valid_until)?,
            is_active: self.is_active,
            created_at: time_from_db(self.created_at)?,
        })
    }
}

/// API key row from database.
#[derive(FromRow)]
pub struct DbApiKey {
    pub id: DbUuid,
    pub name: String,
    pub key_hash: String,
    pub user_id: Option<DbUuid>,
    pub is_active: bool,
    pub created_at: DbTime,
    pub last_used_at: Option<DbTime>,
}

impl DbApiKey {
    /// Convert database row to domain ApiKey.
    pub fn into_domain(self) -> Result<ApiKey, RepoError> {
        Ok(ApiKey {
            id: ApiKeyId::from_uuid(uuid_from_db(self.id)?),
            name: self.name,
            key_hash: self.key_hash,
            user_id: self
                .user_id
                .map(uuid_from_db)
                .transpose()?
                .map(UserId::from_uuid),
            is_active: self.is_active,
            created_at: time_from_db(self.created_at)?,
            last_used_at: opt_time(self.last_used_at)?,
        })
    }
}

/// Maps a unique-constraint violation to `RepoError::Conflict`.
pub fn map_insert_err(e: sqlx::Error, what: &str) -> RepoError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(format!("{} already exists", what))
        }
        _ => RepoError::Database(e.to_string()),
    }
}

/// Generates a raw API key (`sk_` + 32 alphanumerics).
pub fn generate_api_key() -> String {
    use rand::Rng;
    use rand::distr::Alphanumeric;

    let raw_key: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("sk_{}", raw_key)
}
