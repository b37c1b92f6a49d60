//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use settlement_types::{
    ApiKey, AppError, BalanceResponse, BillInquiryRequest, ConfirmRequest, CreateDepositRequest,
    CreateUserRequest, CreateVoucherRequest, InquiryResponse, ListParams, SettlementRepository,
    TransferInquiryRequest, UserId, WebhookAck,
};

use crate::SettlementService;

/// Header carrying the provider's webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Application state shared across handlers.
pub struct AppState<R: SettlementRepository> {
    pub service: SettlementService<R>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::InvalidPin => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InquiryExpired => StatusCode::GONE,
            AppError::InsufficientBalance { .. }
            | AppError::InvalidVoucher(_)
            | AppError::ProviderRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code();

        // Infrastructure details stay in the logs, keyed by a correlation id.
        let body = if self.0.is_retryable() {
            let correlation_id = uuid::Uuid::new_v4();
            tracing::error!(%correlation_id, code, "request failed: {}", self.0);
            serde_json::json!({
                "error": "Temporary failure, please try again",
                "code": code,
                "correlation_id": correlation_id,
            })
        } else {
            serde_json::json!({
                "error": self.0.to_string(),
                "code": code,
            })
        };

        (status, Json(body)).into_response()
    }
}

/// The user a key acts for. Admin keys cannot move money.
fn acting_user(key: &ApiKey) -> Result<UserId, ApiError> {
    key.user_id.ok_or_else(|| {
        AppError::Forbidden("This endpoint requires a user API key".into()).into()
    })
}

fn require_admin(key: &ApiKey) -> Result<(), ApiError> {
    if key.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("This endpoint requires an admin API key".into()).into())
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bootstrap & admin
// ─────────────────────────────────────────────────────────────────────────────

/// Bootstrap endpoint - creates the first (admin) API key.
///
/// This endpoint only works when there are NO existing API keys in the system.
/// It returns the raw API key (only shown once) that should be saved securely.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct BootstrapRequest {
    /// Name for the API key
    #[schema(example = "ops-admin")]
    pub name: String,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct BootstrapResponse {
    /// The generated API key (shown only once)
    #[schema(example = "sk_abc123xyz...")]
    pub api_key: String,
    /// Informational message
    pub message: String,
}

#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn bootstrap<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key_count = state
        .service
        .repo()
        .count_api_keys()
        .await
        .map_err(AppError::from)?;

    if key_count > 0 {
        return Err(AppError::BadRequest(
            "Bootstrap not allowed: API keys already exist. Use an existing key to create new ones.".into()
        ).into());
    }

    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name, None)
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "Admin API key created. Save this key securely - it won't be shown again!"
                .into(),
        }),
    ))
}

/// Create a user with its balance and a user-bound API key (admin only).
#[tracing::instrument(skip(state, key, req))]
pub async fn create_user<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&key)?;
    let created = state.service.create_user(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Create a voucher (admin only).
#[tracing::instrument(skip(state, key), fields(code = %req.code))]
pub async fn create_voucher<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<CreateVoucherRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&key)?;
    let voucher = state.service.create_voucher(req).await?;
    Ok((StatusCode::CREATED, Json(voucher)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Balance & history
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, key))]
pub async fn get_balance<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let balance = state.service.get_balance(user_id).await?;
    Ok(Json(BalanceResponse::from(balance)))
}

#[tracing::instrument(skip(state, key))]
pub async fn list_ledger<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let entries = state.service.list_ledger(user_id, params).await?;
    Ok(Json(entries))
}

#[tracing::instrument(skip(state, key))]
pub async fn list_orders<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let orders = state.service.list_orders(user_id, params).await?;
    Ok(Json(orders))
}

/// Order, deposit or inquiry by id.
#[tracing::instrument(skip(state, key), fields(record_id = %id))]
pub async fn get_status<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let id = uuid::Uuid::parse_str(&id)
        .map_err(|_| AppError::BadRequest("Invalid record ID".into()))?;
    let status = state.service.get_status(user_id, id).await?;
    Ok(Json(status))
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposits
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, key, req), fields(amount = req.amount))]
pub async fn create_deposit<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<CreateDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let deposit = state.service.create_deposit(user_id, req).await?;
    Ok((StatusCode::CREATED, Json(deposit)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Inquiry / confirmation
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, key))]
pub async fn prepaid_inquiry<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<BillInquiryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let inquiry = state.service.prepaid_inquiry(user_id, req).await?;
    Ok(Json(InquiryResponse::from(inquiry)))
}

#[tracing::instrument(skip(state, key, req), fields(inquiry_id = %req.inquiry_id))]
pub async fn pay_prepaid<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let order = state.service.pay_prepaid(user_id, req).await?;
    Ok(Json(order))
}

#[tracing::instrument(skip(state, key))]
pub async fn postpaid_inquiry<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<BillInquiryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let inquiry = state.service.postpaid_inquiry(user_id, req).await?;
    Ok(Json(InquiryResponse::from(inquiry)))
}

#[tracing::instrument(skip(state, key, req), fields(inquiry_id = %req.inquiry_id))]
pub async fn pay_postpaid<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let order = state.service.pay_postpaid(user_id, req).await?;
    Ok(Json(order))
}

#[tracing::instrument(skip(state, key))]
pub async fn transfer_inquiry<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<TransferInquiryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let inquiry = state.service.transfer_inquiry(user_id, req).await?;
    Ok(Json(InquiryResponse::from(inquiry)))
}

#[tracing::instrument(skip(state, key, req), fields(inquiry_id = %req.inquiry_id))]
pub async fn transfer_execute<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(key): Extension<ApiKey>,
    Json(req): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&key)?;
    let order = state.service.transfer_execute(user_id, req).await?;
    Ok(Json(order))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider webhooks
// ─────────────────────────────────────────────────────────────────────────────

/// Provider callback. Authenticated by signature, not by API key.
#[tracing::instrument(skip_all)]
pub async fn provider_webhook<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let disposition = state.service.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck::ok(disposition)))
}
