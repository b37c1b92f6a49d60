//! Domain models for the settlement engine.

pub mod api_key;
pub mod balance;
pub mod deposit;
pub mod id;
pub mod inquiry;
pub mod ledger;
pub mod money;
pub mod order;
pub mod voucher;
pub mod webhook;

pub use api_key::ApiKey;
pub use balance::{Balance, User};
pub use deposit::{Deposit, DepositStatus, PaymentInstructions, PaymentMethod};
pub use id::{ApiKeyId, DepositId, InquiryId, LedgerEntryId, OrderId, UserId};
pub use inquiry::{Inquiry, OrderKind, Target};
pub use ledger::{verify_chain, EntryKind, LedgerEntry};
pub use money::Money;
pub use order::{Order, OrderStatus};
pub use voucher::Voucher;
pub use webhook::{ProviderStatus, ProviderWebhook, WebhookDisposition, WebhookEvent};
