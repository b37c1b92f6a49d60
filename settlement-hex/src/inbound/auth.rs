//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use settlement_types::SettlementRepository;

use super::handlers::AppState;

/// Path of the provider callback; it authenticates by signature instead.
pub const WEBHOOK_PATH: &str = "/api/webhooks/provider";

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Requests that skip API-key authentication.
fn is_public(method: &Method, path: &str) -> bool {
    path == "/health"
        || (path == "/api/bootstrap" && method == Method::POST)
        || (path == WEBHOOK_PATH && method == Method::POST)
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api-docs")
}

/// Authentication middleware that validates API keys.
///
/// This middleware:
/// 1. Extracts the API key from the Authorization header
/// 2. Hashes it using SHA-256
/// 3. Verifies the hash against the database
/// 4. Stores the resolved [`settlement_types::ApiKey`] in the request
///    extensions, so handlers know which user is acting
///
/// Endpoints that bypass authentication:
/// - `/health` - Health check endpoint
/// - `POST /api/bootstrap` - Creates the first API key (only works when no keys exist)
/// - `POST /api/webhooks/provider` - Signed provider callbacks
/// - `/swagger-ui`, `/api-docs` - API documentation
pub async fn auth_middleware<R: SettlementRepository>(
    State(state): State<Arc<AppState<R>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let key_hash = settlement_repo::security::hash_api_key(api_key);

    match state.service.repo().verify_api_key_hash(&key_hash).await {
        Ok(Some(key)) => {
            tracing::debug!(key_id = %key.id, admin = key.is_admin(), "API key accepted");
            request.extensions_mut().insert(key);
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "code": "TRY_AGAIN"
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": "UNAUTHORIZED"
        })),
    )
        .into_response()
}
