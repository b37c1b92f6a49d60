//! Settlement Application Service
//!
//! Orchestrates domain operations through the repository and provider ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! - `inquiry` - read-only quotes
//! - `confirm` - prepaid, postpaid and transfer settlement
//! - `deposit` - top-up requests
//! - `reconciler` - inbound provider webhooks
//! - `status` - status polling and expiry

mod confirm;
mod deposit;
mod inquiry;
mod reconciler;
mod status;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use settlement_repo::security::{hash_pin, is_valid_pin};
use settlement_types::{
    AppError, Balance, CreateUserRequest, CreateUserResponse, CreateVoucherRequest, LedgerEntry,
    ListParams, Money, Order, ProviderOutcome, SettlementProvider, SettlementRepository, User,
    UserId, Voucher,
};

pub use status::SweepReport;

/// Tunables of the settlement flows.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// How long a quote stays confirmable
    pub inquiry_ttl: chrono::Duration,
    /// How long a deposit waits for payment
    pub deposit_ttl: chrono::Duration,
    /// Upper bound on one provider call made under the balance lock
    pub provider_timeout: Duration,
    pub min_deposit: Money,
    /// Shared secret for provider webhook signatures
    pub webhook_secret: String,
    pub sweep_interval: Duration,
    /// Processing orders older than this are reported by the sweeper
    pub stuck_processing_after: chrono::Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            inquiry_ttl: chrono::Duration::minutes(15),
            deposit_ttl: chrono::Duration::hours(24),
            provider_timeout: Duration::from_secs(30),
            min_deposit: Money::new(10_000).unwrap_or(Money::ZERO),
            webhook_secret: String::new(),
            sweep_interval: Duration::from_secs(60),
            stuck_processing_after: chrono::Duration::minutes(30),
        }
    }
}

/// Application service for settlement operations.
///
/// Generic over `R: SettlementRepository` - the adapter is injected at compile time.
/// The provider is a trait object so tests can script its answers.
pub struct SettlementService<R: SettlementRepository> {
    repo: Arc<R>,
    provider: Arc<dyn SettlementProvider>,
    config: Arc<SettlementConfig>,
}

impl<R: SettlementRepository> Clone for SettlementService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            provider: self.provider.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: SettlementRepository> SettlementService<R> {
    pub fn new(repo: R, provider: Arc<dyn SettlementProvider>, config: SettlementConfig) -> Self {
        Self {
            repo: Arc::new(repo),
            provider,
            config: Arc::new(config),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Runs a provider call under `provider_timeout`. An elapsed timeout is
    /// indeterminate: the request may have reached the provider.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = ProviderOutcome<T>>,
    ) -> ProviderOutcome<T> {
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => ProviderOutcome::Indeterminate(
                format!(
                    "provider did not answer within {:?}",
                    self.config.provider_timeout
                )
                .into(),
            ),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Users & vouchers (admin)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a user, its zero balance and an API key bound to it.
    #[tracing::instrument(skip(self, req))]
    pub async fn create_user(&self, req: CreateUserRequest) -> Result<CreateUserResponse, AppError> {
        if !is_valid_pin(&req.pin) {
            return Err(AppError::BadRequest("PIN must be exactly 6 digits".into()));
        }

        let user_id = UserId::new();
        let user = User::new(user_id, hash_pin(&user_id.to_string(), &req.pin));
        let balance = self.repo.create_user(&user).await?;

        let key_name = req
            .key_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("user-{}", user_id));
        let (_, api_key) = self.repo.create_api_key(&key_name, Some(user_id)).await?;

        tracing::info!(%user_id, "user created");
        Ok(CreateUserResponse {
            user_id,
            api_key,
            balance: balance.into(),
        })
    }

    #[tracing::instrument(skip(self, req), fields(code = %req.code))]
    pub async fn create_voucher(&self, req: CreateVoucherRequest) -> Result<Voucher, AppError> {
        let code = req.code.trim();
        if code.is_empty() {
            return Err(AppError::BadRequest("Voucher code cannot be empty".into()));
        }
        let discount = Money::new(req.discount)?;
        if discount.is_zero() {
            return Err(AppError::BadRequest("Discount must be positive".into()));
        }
        let min_amount = Money::new(req.min_amount)?;
        if req.valid_until <= Utc::now() {
            return Err(AppError::BadRequest("valid_until must be in the future".into()));
        }

        let voucher = Voucher::new(code.to_string(), discount, min_amount, req.valid_until);
        self.repo.create_voucher(&voucher).await?;
        Ok(voucher)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Balance & history
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn get_balance(&self, user_id: UserId) -> Result<Balance, AppError> {
        self.repo
            .get_balance(user_id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Balance of {}", user_id))))
    }

    /// Ledger entries of the user, oldest first.
    pub async fn list_ledger(
        &self,
        user_id: UserId,
        params: ListParams,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        self.repo
            .list_ledger_entries(user_id, params.limit(), params.offset())
            .await
            .map_err(Into::into)
    }

    pub async fn list_orders(
        &self,
        user_id: UserId,
        params: ListParams,
    ) -> Result<Vec<Order>, AppError> {
        self.repo
            .list_orders(user_id, params.limit(), params.offset())
            .await
            .map_err(Into::into)
    }
}
