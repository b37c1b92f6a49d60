//! Webhook reconciler: applies asynchronous provider events.
//!
//! Runs under the same locking discipline as the synchronous flows, so an
//! event racing a confirmation waits for the balance lock and then sees the
//! committed order.

use settlement_repo::security::verify_webhook_signature;
use settlement_types::{
    AppError, Balance, Deposit, DepositId, DepositStatus, EntryKind, LedgerEntry, LedgerTx,
    Order, OrderId, OrderStatus, ProviderStatus, ProviderWebhook, SettlementRepository,
    WebhookDisposition, WebhookEvent,
};

use super::SettlementService;

enum Located {
    Order(Order),
    Deposit(Deposit),
}

impl<R: SettlementRepository> SettlementService<R> {
    /// Verifies, parses and applies one provider delivery.
    ///
    /// `signature` is the hex HMAC-SHA256 of `raw_body` under the shared
    /// webhook secret. Nothing is read or written before it checks out.
    #[tracing::instrument(skip_all)]
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookDisposition, AppError> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".into()))?;
        if self.config.webhook_secret.is_empty()
            || !verify_webhook_signature(raw_body, signature, &self.config.webhook_secret)
        {
            tracing::warn!("rejected webhook with bad signature");
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {}", e)))?;
        let webhook: ProviderWebhook = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {}", e)))?;
        tracing::info!(reference_id = %webhook.reference_id, status = %webhook.status, "webhook received");

        let disposition = match self.locate(&webhook).await? {
            Located::Order(order) => self.apply_order_event(order, &webhook).await?,
            Located::Deposit(deposit) => self.apply_deposit_event(deposit, &webhook).await?,
        };

        let event = WebhookEvent::new(&webhook, payload, disposition);
        if let Err(e) = self.repo.record_webhook(&event).await {
            tracing::error!(reference_id = %webhook.reference_id, "failed to record webhook: {}", e);
        }

        tracing::info!(reference_id = %webhook.reference_id, %disposition, "webhook handled");
        Ok(disposition)
    }

    /// Our own id echoed back as `partner_reference_id` first, then the
    /// provider reference. A provider reference shared by several records
    /// surfaces as `Conflict`.
    async fn locate(&self, webhook: &ProviderWebhook) -> Result<Located, AppError> {
        if let Some(id) = webhook
            .partner_reference_id
            .as_deref()
            .and_then(|p| uuid::Uuid::parse_str(p.trim()).ok())
        {
            if let Some(order) = self.repo.get_order(OrderId::from_uuid(id)).await? {
                return Ok(Located::Order(order));
            }
            if let Some(deposit) = self.repo.get_deposit(DepositId::from_uuid(id)).await? {
                return Ok(Located::Deposit(deposit));
            }
        }

        if let Some(order) = self.repo.find_order_by_reference(&webhook.reference_id).await? {
            return Ok(Located::Order(order));
        }
        if let Some(deposit) = self
            .repo
            .find_deposit_by_reference(&webhook.reference_id)
            .await?
        {
            return Ok(Located::Deposit(deposit));
        }

        Err(AppError::NotFound(format!(
            "No order or deposit for reference {}",
            webhook.reference_id
        )))
    }

    async fn apply_order_event(
        &self,
        order: Order,
        webhook: &ProviderWebhook,
    ) -> Result<WebhookDisposition, AppError> {
        let intended = match webhook.status {
            ProviderStatus::Success => OrderStatus::Success,
            ProviderStatus::Failed | ProviderStatus::Expired => OrderStatus::Failed,
            ProviderStatus::Refunded => OrderStatus::Refunded,
            ProviderStatus::Pending => return Ok(WebhookDisposition::Ignored),
        };
        if order.status == intended {
            return Ok(WebhookDisposition::AlreadyApplied);
        }

        let mut tx = self.repo.begin().await?;
        let mut balance = tx.lock_balance(order.user_id).await?;
        let mut order = tx.lock_order(order.id).await?;
        if order.status == intended {
            tx.rollback().await?;
            return Ok(WebhookDisposition::AlreadyApplied);
        }

        let total = order.total_payment;
        match (order.status, webhook.status) {
            (OrderStatus::PendingPayment, _) => {
                tx.rollback().await?;
                return Err(AppError::Conflict(format!(
                    "Order {} has not been settled yet, retry later",
                    order.id
                )));
            }
            (OrderStatus::Processing, ProviderStatus::Success) => {
                order.succeed(Some(webhook.reference_id.clone()), webhook.serial_number.clone())?;
                balance.release(total);
            }
            (OrderStatus::Processing, ProviderStatus::Failed | ProviderStatus::Expired) => {
                let reason = webhook
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("provider reported {}", webhook.status));
                order.fail(reason)?;
                credit_back(&mut *tx, &mut balance, &order).await?;
                balance.release(total);
            }
            (OrderStatus::Success, ProviderStatus::Refunded) => {
                order.refund(webhook.message.clone())?;
                credit_back(&mut *tx, &mut balance, &order).await?;
            }
            (OrderStatus::Expired, ProviderStatus::Success) => {
                tx.rollback().await?;
                tracing::error!(
                    order_id = %order.id,
                    reference_id = %webhook.reference_id,
                    amount = %total,
                    "provider settled an order that was never debited"
                );
                return Ok(WebhookDisposition::Ignored);
            }
            (current, event) => {
                tx.rollback().await?;
                tracing::warn!(order_id = %order.id, %current, %event, "ignoring stale webhook");
                return Ok(WebhookDisposition::Ignored);
            }
        }

        tx.persist_balance(&mut balance).await?;
        tx.persist_order(&order).await?;
        tx.commit().await?;
        tracing::info!(order_id = %order.id, status = %order.status, "order reconciled");
        Ok(WebhookDisposition::Applied)
    }

    async fn apply_deposit_event(
        &self,
        deposit: Deposit,
        webhook: &ProviderWebhook,
    ) -> Result<WebhookDisposition, AppError> {
        let intended = match webhook.status {
            ProviderStatus::Success => DepositStatus::Success,
            ProviderStatus::Failed => DepositStatus::Failed,
            ProviderStatus::Expired => DepositStatus::Expired,
            ProviderStatus::Refunded | ProviderStatus::Pending => {
                tracing::warn!(deposit_id = %deposit.id, status = %webhook.status, "ignoring deposit webhook");
                return Ok(WebhookDisposition::Ignored);
            }
        };
        if let Some(amount) = webhook.amount {
            if amount != deposit.amount {
                return Err(AppError::BadRequest(format!(
                    "Amount mismatch for deposit {}: expected {}, got {}",
                    deposit.id, deposit.amount, amount
                )));
            }
        }
        if deposit.status == intended {
            return Ok(WebhookDisposition::AlreadyApplied);
        }

        let mut tx = self.repo.begin().await?;
        let mut balance = tx.lock_balance(deposit.user_id).await?;
        let mut deposit = tx.lock_deposit(deposit.id).await?;
        if deposit.status == intended {
            tx.rollback().await?;
            return Ok(WebhookDisposition::AlreadyApplied);
        }

        match (deposit.status, webhook.status) {
            (DepositStatus::Pending | DepositStatus::Expired, ProviderStatus::Success) => {
                let before = balance.amount;
                balance.credit(deposit.amount)?;
                deposit.mark_paid(before, balance.amount)?;
                tx.append_ledger_entry(&LedgerEntry::for_deposit(
                    deposit.user_id,
                    deposit.id,
                    deposit.amount,
                    before,
                    balance.amount,
                ))
                .await?;
                tx.persist_balance(&mut balance).await?;
            }
            (DepositStatus::Pending, ProviderStatus::Failed) => deposit.fail()?,
            (DepositStatus::Pending, ProviderStatus::Expired) => deposit.expire()?,
            (current, event) => {
                tx.rollback().await?;
                tracing::warn!(deposit_id = %deposit.id, %current, %event, "ignoring stale webhook");
                return Ok(WebhookDisposition::Ignored);
            }
        }

        tx.persist_deposit(&deposit).await?;
        tx.commit().await?;
        tracing::info!(deposit_id = %deposit.id, status = %deposit.status, "deposit reconciled");
        Ok(WebhookDisposition::Applied)
    }
}

/// Credits the order total back with a `refund` ledger entry.
async fn credit_back(
    tx: &mut dyn LedgerTx,
    balance: &mut Balance,
    order: &Order,
) -> Result<(), AppError> {
    let before = balance.amount;
    balance.credit(order.total_payment)?;
    tx.append_ledger_entry(&LedgerEntry::for_order(
        order.user_id,
        order.id,
        EntryKind::Refund,
        order.total_payment,
        before,
        balance.amount,
    ))
    .await?;
    Ok(())
}
