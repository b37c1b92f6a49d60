use settlement_types::{
    AppError, CreateDepositRequest, Deposit, Money, PaymentRequest, ProviderOutcome,
    SettlementRepository, UserId,
};

use super::SettlementService;

impl<R: SettlementRepository> SettlementService<R> {
    /// Requests payment instructions for a top-up.
    ///
    /// The balance is not touched here; it is credited only when the
    /// provider's `paid` webhook arrives. The deposit row is stored whatever
    /// the provider answered, so a late webhook always finds it.
    #[tracing::instrument(skip(self, req), fields(amount = req.amount))]
    pub async fn create_deposit(
        &self,
        user_id: UserId,
        req: CreateDepositRequest,
    ) -> Result<Deposit, AppError> {
        let amount = Money::new(req.amount)?;
        if amount < self.config.min_deposit {
            return Err(AppError::BadRequest(format!(
                "Minimum deposit is {}",
                self.config.min_deposit
            )));
        }
        req.method.validate().map_err(AppError::BadRequest)?;
        if self.repo.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }

        let mut deposit = Deposit::new(user_id, req.method, amount, self.config.deposit_ttl);
        let request = PaymentRequest {
            partner_reference_id: deposit.id.to_string(),
            method: deposit.method.clone(),
            amount,
            expires_at: deposit.expires_at,
        };

        match self.bounded(self.provider.create_payment(&request)).await {
            ProviderOutcome::Success(instructions) => {
                deposit.attach_instructions(instructions);
                self.repo.create_deposit(&deposit).await?;
                tracing::info!(deposit_id = %deposit.id, "deposit awaiting payment");
                Ok(deposit)
            }
            ProviderOutcome::Failure(reason) => {
                deposit.fail()?;
                self.repo.create_deposit(&deposit).await?;
                Err(AppError::ProviderRejected(reason))
            }
            ProviderOutcome::Indeterminate(unconfirmed) => {
                // Matchable by the provider's reference too, when it gave one.
                deposit.external_reference_id = unconfirmed.reference_id.clone();
                self.repo.create_deposit(&deposit).await?;
                tracing::warn!(deposit_id = %deposit.id, reason = %unconfirmed, "payment request outcome unknown");
                Err(AppError::ProviderUnavailable(unconfirmed.reason))
            }
        }
    }
}
