//! # Settlement Hex
//!
//! Application service layer and adapters for the balance settlement engine.
//!
//! ## Architecture
//!
//! - `service/` - Application service (orchestrator, reconciler, expiry)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - Settlement provider adapter (reqwest)
//! - `sweeper` - Background expiry loop
//!
//! The service is generic over `R: SettlementRepository`, allowing
//! different repository implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod service;
pub mod sweeper;


pub use outbound::{HttpProvider, ProviderConfig};
pub use service::{SettlementConfig, SettlementService, SweepReport};
pub use sweeper::ExpirySweeper;
