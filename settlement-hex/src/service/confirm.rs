//! Confirmation of a staged inquiry: the only path that debits the balance.
//!
//! The balance row is locked first, then the order row. The debit, the
//! provider call and the outcome are persisted in one unit of work, so a
//! crash before commit leaves the order `PendingPayment` and safe to retry.
//! The provider deduplicates on `partner_reference_id`.

use chrono::Utc;
use settlement_repo::security::{is_valid_pin, verify_pin};
use settlement_types::{
    AppError, ConfirmRequest, EntryKind, ExecuteRequest, Inquiry, LedgerEntry, Money, Order,
    OrderId, OrderKind, OrderStatus, ProviderOutcome, RepoError, SettlementRepository, UserId,
};

use super::SettlementService;

impl<R: SettlementRepository> SettlementService<R> {
    pub async fn pay_prepaid(&self, user_id: UserId, req: ConfirmRequest) -> Result<Order, AppError> {
        self.confirm(user_id, OrderKind::Prepaid, req).await
    }

    pub async fn pay_postpaid(
        &self,
        user_id: UserId,
        req: ConfirmRequest,
    ) -> Result<Order, AppError> {
        self.confirm(user_id, OrderKind::Postpaid, req).await
    }

    pub async fn transfer_execute(
        &self,
        user_id: UserId,
        req: ConfirmRequest,
    ) -> Result<Order, AppError> {
        self.confirm(user_id, OrderKind::Transfer, req).await
    }

    #[tracing::instrument(skip(self, req), fields(inquiry_id = %req.inquiry_id))]
    async fn confirm(
        &self,
        user_id: UserId,
        kind: OrderKind,
        req: ConfirmRequest,
    ) -> Result<Order, AppError> {
        let inquiry = self
            .repo
            .find_inquiry(user_id, req.inquiry_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Inquiry {}", req.inquiry_id)))?;
        if inquiry.kind() != kind {
            return Err(AppError::BadRequest(format!(
                "Inquiry {} is a {} quote",
                inquiry.id,
                inquiry.kind().as_str()
            )));
        }

        let existing = self.repo.find_order_by_inquiry(inquiry.id).await?;
        match &existing {
            Some(order) if order.status != OrderStatus::PendingPayment => {
                return Ok(order.clone());
            }
            None if inquiry.is_expired() => return Err(AppError::InquiryExpired),
            _ => {}
        }

        self.check_pin(user_id, &req.pin).await?;
        let order = match existing {
            Some(order) => order,
            None => match self.stage_order(&inquiry, req.voucher_code).await? {
                Staged::Created(order) | Staged::Pending(order) => order,
                Staged::Settled(order) => return Ok(order),
            },
        };

        // A dropped client future must not abort the unit of work half way.
        let this = self.clone();
        let order_id = order.id;
        tokio::spawn(async move { this.settle(user_id, order_id).await })
            .await
            .map_err(|e| AppError::Internal(format!("settlement task failed: {}", e)))?
    }

    async fn check_pin(&self, user_id: UserId, pin: &str) -> Result<(), AppError> {
        if !is_valid_pin(pin) {
            return Err(AppError::BadRequest("PIN must be exactly 6 digits".into()));
        }
        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        if !verify_pin(&user_id.to_string(), pin, &user.pin_hash) {
            tracing::warn!(%user_id, "PIN mismatch");
            return Err(AppError::InvalidPin);
        }
        Ok(())
    }

    async fn voucher_discount(
        &self,
        inquiry: &Inquiry,
        code: Option<&str>,
    ) -> Result<Money, AppError> {
        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(Money::ZERO);
        };
        let voucher = self
            .repo
            .find_voucher(code)
            .await?
            .ok_or_else(|| AppError::InvalidVoucher(format!("Unknown voucher {}", code)))?;
        let subtotal = inquiry.amount.checked_add(inquiry.fee)?;
        Ok(voucher.apply(subtotal, Utc::now())?)
    }

    /// Inserts the `PendingPayment` order. The unique inquiry constraint
    /// decides which of several concurrent confirmations owns the insert.
    async fn stage_order(
        &self,
        inquiry: &Inquiry,
        voucher_code: Option<String>,
    ) -> Result<Staged, AppError> {
        let discount = self.voucher_discount(inquiry, voucher_code.as_deref()).await?;
        let voucher_code = voucher_code.filter(|_| !discount.is_zero());
        let order = Order::from_inquiry(inquiry, discount, voucher_code)?;

        match self.repo.create_order(&order).await {
            Ok(()) => {
                tracing::info!(order_id = %order.id, total = order.total_payment.amount(), "order created");
                Ok(Staged::Created(order))
            }
            Err(RepoError::Conflict(_)) => {
                let order = self
                    .repo
                    .find_order_by_inquiry(inquiry.id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!("order for inquiry {} vanished", inquiry.id))
                    })?;
                if order.status == OrderStatus::PendingPayment {
                    Ok(Staged::Pending(order))
                } else {
                    Ok(Staged::Settled(order))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The locked section: lock, re-validate, debit, call the provider,
    /// persist the outcome, commit.
    #[tracing::instrument(skip(self), fields(%order_id))]
    async fn settle(&self, user_id: UserId, order_id: OrderId) -> Result<Order, AppError> {
        let mut tx = self.repo.begin().await?;
        let mut balance = match tx.lock_balance(user_id).await {
            Ok(balance) => balance,
            Err(RepoError::NotFound) => {
                tracing::error!(%user_id, "user has no balance row");
                return Err(AppError::Internal(format!("balance of {} missing", user_id)));
            }
            Err(e) => return Err(e.into()),
        };
        let mut order = tx.lock_order(order_id).await?;

        // Another request settled this order while we waited for the lock.
        if order.status != OrderStatus::PendingPayment {
            tx.rollback().await?;
            return Ok(order);
        }
        if order.is_expired_at(Utc::now()) {
            order.expire()?;
            tx.persist_order(&order).await?;
            tx.commit().await?;
            tracing::info!("order expired before payment");
            return Err(AppError::InquiryExpired);
        }

        let total = order.total_payment;
        if !balance.has_sufficient_funds(total) {
            tx.rollback().await?;
            return Err(AppError::InsufficientBalance {
                available: balance.amount.amount(),
                requested: total.amount(),
            });
        }

        let before = balance.amount;
        balance.debit(total)?;
        order.mark_debited(before, balance.amount)?;
        tx.append_ledger_entry(&LedgerEntry::for_order(
            user_id,
            order.id,
            EntryKind::Debit,
            total,
            before,
            balance.amount,
        ))
        .await?;

        let request = ExecuteRequest {
            partner_reference_id: order.id.to_string(),
            inquiry_reference_id: order.external_reference_id.clone(),
            target: order.target.clone(),
            amount: order.amount,
        };
        let outcome = match order.kind {
            OrderKind::Transfer => self.bounded(self.provider.transfer_execute(&request)).await,
            OrderKind::Prepaid | OrderKind::Postpaid => {
                self.bounded(self.provider.create_transaction(&request)).await
            }
        };
        tracing::info!(outcome = outcome.label(), "provider answered");
        let provider_acted = !matches!(outcome, ProviderOutcome::Failure(_));

        match outcome {
            ProviderOutcome::Success(receipt) => {
                order.succeed(Some(receipt.reference_id), receipt.serial_number)?;
            }
            ProviderOutcome::Failure(reason) => {
                order.fail(reason)?;
                let refund_before = balance.amount;
                balance.credit(total)?;
                tx.append_ledger_entry(&LedgerEntry::for_order(
                    user_id,
                    order.id,
                    EntryKind::Refund,
                    total,
                    refund_before,
                    balance.amount,
                ))
                .await?;
            }
            ProviderOutcome::Indeterminate(unconfirmed) => {
                // Debit stays; a webhook or manual reconciliation resolves it.
                balance.hold(total)?;
                if let Some(reference) = unconfirmed.reference_id.clone() {
                    order.track_reference(reference);
                }
                tracing::warn!(order_id = %order.id, reason = %unconfirmed, "provider outcome unknown, order left processing");
            }
        }

        let written: Result<(), RepoError> = async {
            tx.persist_balance(&mut balance).await?;
            tx.persist_order(&order).await?;
            tx.commit().await
        }
        .await;
        if let Err(e) = written {
            // The debit rolls back while the provider may already be delivering.
            if provider_acted {
                tracing::error!(
                    order_id = %order.id,
                    reference_id = %order.external_reference_id,
                    amount = %total,
                    "provider accepted an order whose settlement was not recorded: {}",
                    e
                );
            }
            return Err(e.into());
        }

        tracing::info!(status = %order.status, balance_after = balance.amount.amount(), "order settled");
        Ok(order)
    }
}

enum Staged {
    Created(Order),
    /// Another request created it and has not settled it yet
    Pending(Order),
    Settled(Order),
}
