//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod auth;
pub(crate) mod handlers;
mod rate_limit;
mod server;

pub use auth::WEBHOOK_PATH;
pub use handlers::SIGNATURE_HEADER;
pub use rate_limit::Throttle;
pub use server::HttpServer;
