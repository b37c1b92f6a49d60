//! Read-only quotes. Inquiries never touch the balance.

use settlement_types::{
    AppError, BillInquiryRequest, Inquiry, Money, ProviderOutcome, QuoteRequest,
    SettlementRepository, Target, TransferInquiryRequest, UserId,
};

use super::SettlementService;

impl<R: SettlementRepository> SettlementService<R> {
    pub async fn prepaid_inquiry(
        &self,
        user_id: UserId,
        req: BillInquiryRequest,
    ) -> Result<Inquiry, AppError> {
        let target = Target::Prepaid {
            product_code: req.product_code,
            customer_number: req.customer_number,
        };
        self.inquire(user_id, target, None).await
    }

    pub async fn postpaid_inquiry(
        &self,
        user_id: UserId,
        req: BillInquiryRequest,
    ) -> Result<Inquiry, AppError> {
        let target = Target::Postpaid {
            product_code: req.product_code,
            customer_number: req.customer_number,
        };
        self.inquire(user_id, target, None).await
    }

    pub async fn transfer_inquiry(
        &self,
        user_id: UserId,
        req: TransferInquiryRequest,
    ) -> Result<Inquiry, AppError> {
        let amount = Money::new(req.amount)?;
        if amount.is_zero() {
            return Err(AppError::BadRequest("Amount must be positive".into()));
        }
        let target = Target::Transfer {
            bank_code: req.bank_code,
            account_number: req.account_number,
        };
        self.inquire(user_id, target, Some(amount)).await
    }

    /// Quotes the target with the provider and stages the result.
    #[tracing::instrument(skip(self, target), fields(kind = target.kind().as_str()))]
    async fn inquire(
        &self,
        user_id: UserId,
        target: Target,
        amount: Option<Money>,
    ) -> Result<Inquiry, AppError> {
        target.validate().map_err(AppError::BadRequest)?;
        if self.repo.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }

        let request = QuoteRequest {
            user_id,
            target: target.clone(),
            amount,
        };
        let quote = match self.bounded(self.provider.inquire(&request)).await {
            ProviderOutcome::Success(quote) => quote,
            ProviderOutcome::Failure(reason) => return Err(AppError::ProviderRejected(reason)),
            ProviderOutcome::Indeterminate(unconfirmed) => {
                tracing::warn!(reason = %unconfirmed, "inquiry outcome unknown");
                return Err(AppError::ProviderUnavailable(unconfirmed.reason));
            }
        };

        let inquiry = Inquiry::new(
            user_id,
            target,
            quote.amount,
            quote.fee,
            quote.customer_name,
            quote.reference_id,
            self.config.inquiry_ttl,
        );
        self.repo.create_inquiry(&inquiry).await?;

        tracing::info!(inquiry_id = %inquiry.id, amount = inquiry.amount.amount(), "inquiry staged");
        Ok(inquiry)
    }
}
