//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use settlement_types::SettlementRepository;

use super::auth::{WEBHOOK_PATH, auth_middleware};
use super::handlers::{self, AppState};
use super::rate_limit::{Throttle, throttle_middleware};
use crate::SettlementService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Settlement API.
pub struct HttpServer<R: SettlementRepository> {
    state: Arc<AppState<R>>,
    throttle: Arc<Throttle>,
}

impl<R: SettlementRepository> HttpServer<R> {
    /// Creates a new HTTP server with the given service.
    pub fn new(service: SettlementService<R>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            throttle: Arc::new(Throttle::default()),
        }
    }

    /// Creates a new HTTP server allowing `requests_per_minute` per API key.
    pub fn with_rate_limit(service: SettlementService<R>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            throttle: Arc::new(Throttle::per_minute(requests_per_minute)),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/bootstrap", post(handlers::bootstrap::<R>))
            .route("/api/users", post(handlers::create_user::<R>))
            .route("/api/vouchers", post(handlers::create_voucher::<R>))
            .route("/api/balance", get(handlers::get_balance::<R>))
            .route("/api/ledger", get(handlers::list_ledger::<R>))
            .route("/api/deposits", post(handlers::create_deposit::<R>))
            .route("/api/prepaid/inquiry", post(handlers::prepaid_inquiry::<R>))
            .route("/api/prepaid/pay", post(handlers::pay_prepaid::<R>))
            .route("/api/postpaid/inquiry", post(handlers::postpaid_inquiry::<R>))
            .route("/api/postpaid/pay", post(handlers::pay_postpaid::<R>))
            .route("/api/transfers/inquiry", post(handlers::transfer_inquiry::<R>))
            .route("/api/transfers/execute", post(handlers::transfer_execute::<R>))
            .route("/api/orders", get(handlers::list_orders::<R>))
            .route("/api/status/{id}", get(handlers::get_status::<R>))
            .route(WEBHOOK_PATH, post(handlers::provider_webhook::<R>))
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.throttle.clone(),
                throttle_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let throttle = self.throttle.clone();
        let pruning = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                throttle.forget_idle();
                tracing::debug!(callers = throttle.tracked_callers(), "rate limit buckets pruned");
            }
        });

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        pruning.abort();

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
