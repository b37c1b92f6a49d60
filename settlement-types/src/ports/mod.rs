//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod provider;
mod repository;

pub use provider::{
    ExecuteRequest, PaymentRequest, ProviderOutcome, ProviderQuote, ProviderReceipt, QuoteRequest,
    SettlementProvider, Unconfirmed,
};
pub use repository::{LedgerTx, SettlementRepository};
