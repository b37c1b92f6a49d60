use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::money::Money;
use crate::error::DomainError;

/// A discount code. It only ever reduces the payable amount.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Voucher {
    #[schema(example = "HEMAT10")]
    pub code: String,
    pub discount: Money,
    /// Minimum `amount + fee` the voucher applies to
    pub min_amount: Money,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    pub fn new(code: String, discount: Money, min_amount: Money, valid_until: DateTime<Utc>) -> Self {
        Self {
            code,
            discount,
            min_amount,
            valid_until,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Returns the discount for a payable subtotal, capped at the subtotal.
    pub fn apply(&self, subtotal: Money, now: DateTime<Utc>) -> Result<Money, DomainError> {
        if !self.is_active {
            return Err(DomainError::InvalidVoucher(format!(
                "Voucher {} is not active",
                self.code
            )));
        }
        if now >= self.valid_until {
            return Err(DomainError::InvalidVoucher(format!(
                "Voucher {} has expired",
                self.code
            )));
        }
        if subtotal < self.min_amount {
            return Err(DomainError::InvalidVoucher(format!(
                "Voucher {} requires a minimum of {}",
                self.code, self.min_amount
            )));
        }
        Ok(self.discount.min(subtotal))
    }
}
