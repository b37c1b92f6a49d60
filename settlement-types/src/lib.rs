//! # Settlement Types
//!
//! Domain types and port traits for the balance settlement engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Balance, Inquiry, Order, Deposit)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    ApiKey, ApiKeyId, Balance, Deposit, DepositId, DepositStatus, EntryKind, Inquiry, InquiryId,
    LedgerEntry, LedgerEntryId, Money, Order, OrderId, OrderKind, OrderStatus, PaymentInstructions,
    PaymentMethod, ProviderStatus, ProviderWebhook, Target, User, UserId, Voucher,
    WebhookDisposition, WebhookEvent,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    ExecuteRequest, LedgerTx, PaymentRequest, ProviderOutcome, ProviderQuote, ProviderReceipt,
    QuoteRequest, SettlementProvider, SettlementRepository, Unconfirmed,
};
