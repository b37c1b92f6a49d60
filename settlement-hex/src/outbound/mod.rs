//! Outbound adapters: the settlement provider gateway.

mod provider;

pub use provider::{HttpProvider, ProviderConfig, ProviderResponse, classify};
