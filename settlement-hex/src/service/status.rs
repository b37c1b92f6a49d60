//! Status polling and expiry of stale pending records.

use chrono::{DateTime, Utc};
use settlement_types::{
    AppError, Deposit, DepositId, DepositStatus, InquiryId, Order, OrderId, OrderStatus,
    SettlementRepository, StatusResponse, UserId,
};

use super::SettlementService;

/// Records handled per sweep query.
const SWEEP_BATCH: i64 = 100;

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_orders: usize,
    pub expired_deposits: usize,
    pub stuck_orders: usize,
}

impl<R: SettlementRepository> SettlementService<R> {
    /// Resolves an id to the caller's order, deposit or inquiry.
    ///
    /// A pending order or deposit past its deadline is expired on the way out.
    /// An inquiry that was already confirmed resolves to its order.
    #[tracing::instrument(skip(self))]
    pub async fn get_status(
        &self,
        user_id: UserId,
        id: uuid::Uuid,
    ) -> Result<StatusResponse, AppError> {
        let not_found = || AppError::NotFound(format!("No record {}", id));
        let now = Utc::now();

        if let Some(order) = self.repo.get_order(OrderId::from_uuid(id)).await? {
            if order.user_id != user_id {
                return Err(not_found());
            }
            return Ok(StatusResponse::Order(self.current_order(order, now).await?));
        }

        if let Some(deposit) = self.repo.get_deposit(DepositId::from_uuid(id)).await? {
            if deposit.user_id != user_id {
                return Err(not_found());
            }
            let deposit = if deposit.is_expired_at(now) {
                self.expire_deposit(&deposit, now).await?
            } else {
                deposit
            };
            return Ok(StatusResponse::Deposit(deposit));
        }

        let inquiry = self
            .repo
            .find_inquiry(user_id, InquiryId::from_uuid(id))
            .await?
            .ok_or_else(not_found)?;
        match self.repo.find_order_by_inquiry(inquiry.id).await? {
            Some(order) => Ok(StatusResponse::Order(self.current_order(order, now).await?)),
            None => Ok(StatusResponse::Inquiry(inquiry.into())),
        }
    }

    async fn current_order(&self, order: Order, now: DateTime<Utc>) -> Result<Order, AppError> {
        if order.is_expired_at(now) {
            self.expire_order(&order, now).await
        } else {
            Ok(order)
        }
    }

    /// Marks a `PendingPayment` order `Expired` if it is still due.
    /// Returns the order as stored afterwards.
    async fn expire_order(&self, order: &Order, now: DateTime<Utc>) -> Result<Order, AppError> {
        let mut tx = self.repo.begin().await?;
        tx.lock_balance(order.user_id).await?;
        let mut locked = tx.lock_order(order.id).await?;
        if !locked.is_expired_at(now) {
            tx.rollback().await?;
            return Ok(locked);
        }
        locked.expire()?;
        tx.persist_order(&locked).await?;
        tx.commit().await?;
        tracing::info!(order_id = %locked.id, "order expired");
        Ok(locked)
    }

    async fn expire_deposit(
        &self,
        deposit: &Deposit,
        now: DateTime<Utc>,
    ) -> Result<Deposit, AppError> {
        let mut tx = self.repo.begin().await?;
        tx.lock_balance(deposit.user_id).await?;
        let mut locked = tx.lock_deposit(deposit.id).await?;
        if !locked.is_expired_at(now) {
            tx.rollback().await?;
            return Ok(locked);
        }
        locked.expire()?;
        tx.persist_deposit(&locked).await?;
        tx.commit().await?;
        tracing::info!(deposit_id = %locked.id, "deposit expired");
        Ok(locked)
    }

    /// Expires overdue pending orders and deposits and reports orders stuck
    /// in `Processing`. Failures on single records are logged and skipped.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut report = SweepReport::default();

        for order in self.repo.list_expired_pending_orders(now, SWEEP_BATCH).await? {
            match self.expire_order(&order, now).await {
                Ok(o) if o.status == OrderStatus::Expired => report.expired_orders += 1,
                Ok(_) => {}
                Err(e) => tracing::error!(order_id = %order.id, "failed to expire order: {}", e),
            }
        }

        for deposit in self.repo.list_expired_pending_deposits(now, SWEEP_BATCH).await? {
            match self.expire_deposit(&deposit, now).await {
                Ok(d) if d.status == DepositStatus::Expired => report.expired_deposits += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(deposit_id = %deposit.id, "failed to expire deposit: {}", e)
                }
            }
        }

        let cutoff = now - self.config.stuck_processing_after;
        for order in self.repo.list_stuck_processing_orders(cutoff, SWEEP_BATCH).await? {
            report.stuck_orders += 1;
            tracing::warn!(
                order_id = %order.id,
                user_id = %order.user_id,
                reference_id = %order.external_reference_id,
                since = %order.updated_at,
                "order stuck in processing, needs reconciliation"
            );
        }

        Ok(report)
    }
}
