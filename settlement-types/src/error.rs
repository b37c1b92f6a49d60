//! Error types for the settlement engine.

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid voucher: {0}")]
    InvalidVoucher(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Each variant carries a stable machine code, see [`AppError::code`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Inquiry expired")]
    InquiryExpired,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Invalid voucher: {0}")]
    InvalidVoucher(String),

    #[error("Provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidPin => "INVALID_PIN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InquiryExpired => "INQUIRY_EXPIRED",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::InvalidVoucher(_) => "INVALID_VOUCHER",
            AppError::ProviderRejected(_) => "PROVIDER_REJECTED",
            AppError::ProviderUnavailable(_) | AppError::Internal(_) => "TRY_AGAIN",
        }
    }

    /// Infrastructure failures whose details must not leak to clients.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable(_) | AppError::Internal(_)
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientBalance {
                available,
                requested,
            } => AppError::InsufficientBalance {
                available,
                requested,
            },
            DomainError::InvalidVoucher(msg) => AppError::InvalidVoucher(msg),
            DomainError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            DomainError::Validation(msg) => AppError::BadRequest(msg),
            DomainError::NegativeAmount => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_errors_map_to_app_errors() {
        let err: AppError = RepoError::Domain(DomainError::InsufficientBalance {
            available: 10,
            requested: 20,
        })
        .into();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");

        let err: AppError = RepoError::Database("connection reset".into()).into();
        assert_eq!(err.code(), "TRY_AGAIN");
        assert!(err.is_retryable());

        let err: AppError = RepoError::Conflict("duplicate inquiry".into()).into();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn test_transition_errors_are_conflicts() {
        let err: AppError = DomainError::InvalidTransition {
            from: "FAILED".into(),
            to: "SUCCESS".into(),
        }
        .into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
