//! Settlement CLI
//!
//! Command-line interface for the settlement API.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use settlement_client::SettlementClient;
use settlement_repo::security::sign_webhook;
use settlement_types::{CreateVoucherRequest, InquiryId, ListParams, PaymentMethod};

#[derive(Parser)]
#[command(name = "settlement")]
#[command(author, version, about = "Settlement API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the settlement API
    #[arg(
        long,
        env = "SETTLEMENT_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "SETTLEMENT_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management (admin key)
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Voucher management (admin key)
    Voucher {
        #[command(subcommand)]
        action: VoucherCommands,
    },
    /// Show the balance of the key's user
    Balance,
    /// List ledger entries, oldest first
    Ledger {
        #[command(flatten)]
        page: Page,
    },
    /// List orders, newest first
    Orders {
        #[command(flatten)]
        page: Page,
    },
    /// Request payment instructions for a top-up
    Deposit {
        #[arg(long)]
        amount: i64,
        #[arg(long, value_enum, default_value = "qris")]
        method: Method,
        /// Bank code for virtual accounts
        #[arg(long)]
        bank_code: Option<String>,
        /// Store name for retail payments
        #[arg(long)]
        store: Option<String>,
    },
    /// Prepaid purchases (pulsa, tokens)
    Prepaid {
        #[command(subcommand)]
        action: BillCommands,
    },
    /// Postpaid bill payments
    Postpaid {
        #[command(subcommand)]
        action: BillCommands,
    },
    /// Bank transfers
    Transfer {
        #[command(subcommand)]
        action: TransferCommands,
    },
    /// Look up an order, deposit or inquiry by id
    Status {
        id: String,
    },
    /// Provider webhook helpers for sandboxes
    Webhook {
        #[command(subcommand)]
        action: WebhookCommands,
    },
    /// Bootstrap the first API key
    Bootstrap {
        /// Name for the new API key
        #[arg(long, default_value = "bootstrap-key")]
        name: String,
    },
    /// Check API health
    Health,
}

#[derive(clap::Args)]
struct Page {
    #[arg(long)]
    limit: Option<i64>,
    #[arg(long)]
    offset: Option<i64>,
}

impl From<Page> for ListParams {
    fn from(p: Page) -> Self {
        ListParams {
            limit: p.limit,
            offset: p.offset,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    VirtualAccount,
    Qris,
    Retail,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print its API key
    Create {
        /// Six digit PIN
        #[arg(long)]
        pin: String,
        #[arg(long)]
        key_name: Option<String>,
    },
}

#[derive(Subcommand)]
enum VoucherCommands {
    Create {
        #[arg(long)]
        code: String,
        #[arg(long)]
        discount: i64,
        #[arg(long, default_value = "0")]
        min_amount: i64,
        /// RFC 3339 timestamp
        #[arg(long)]
        valid_until: DateTime<Utc>,
    },
}

#[derive(Subcommand)]
enum BillCommands {
    /// Get a quote
    Inquiry {
        #[arg(long)]
        product: String,
        #[arg(long)]
        customer: String,
    },
    /// Confirm a quote and pay
    Pay {
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(Subcommand)]
enum TransferCommands {
    Inquiry {
        #[arg(long)]
        bank_code: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: i64,
    },
    Execute {
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(clap::Args)]
struct Confirm {
    /// Inquiry ID (UUID)
    #[arg(long)]
    inquiry: String,
    #[arg(long)]
    pin: String,
    #[arg(long)]
    voucher: Option<String>,
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// Print the signature for a payload
    Sign {
        payload: String,
        #[arg(long, env = "WEBHOOK_SECRET")]
        secret: String,
    },
    /// Sign a payload and deliver it as the provider would
    Send {
        payload: String,
        #[arg(long, env = "WEBHOOK_SECRET")]
        secret: String,
    },
}

fn parse_inquiry_id(s: &str) -> Result<InquiryId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid inquiry ID: {}", s))
}

fn payment_method(
    method: Method,
    bank_code: Option<String>,
    store: Option<String>,
) -> Result<PaymentMethod> {
    Ok(match method {
        Method::Qris => PaymentMethod::Qris,
        Method::VirtualAccount => PaymentMethod::VirtualAccount {
            bank_code: bank_code
                .ok_or_else(|| anyhow::anyhow!("--bank-code is required for virtual accounts"))?,
        },
        Method::Retail => PaymentMethod::Retail {
            store: store.ok_or_else(|| anyhow::anyhow!("--store is required for retail"))?,
        },
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = SettlementClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Bootstrap { name } => {
            let api_key = client.bootstrap(&name).await?;
            println!("{}", api_key);
        }

        Commands::User { action } => match action {
            UserCommands::Create { pin, key_name } => {
                let created = client.create_user(&pin, key_name).await?;
                print_json(&created)?;
            }
        },

        Commands::Voucher { action } => match action {
            VoucherCommands::Create {
                code,
                discount,
                min_amount,
                valid_until,
            } => {
                let voucher = client
                    .create_voucher(&CreateVoucherRequest {
                        code,
                        discount,
                        min_amount,
                        valid_until,
                    })
                    .await?;
                print_json(&voucher)?;
            }
        },

        Commands::Balance => print_json(&client.balance().await?)?,
        Commands::Ledger { page } => print_json(&client.ledger(page.into()).await?)?,
        Commands::Orders { page } => print_json(&client.orders(page.into()).await?)?,

        Commands::Deposit {
            amount,
            method,
            bank_code,
            store,
        } => {
            let method = payment_method(method, bank_code, store)?;
            print_json(&client.create_deposit(amount, method).await?)?;
        }

        Commands::Prepaid { action } => match action {
            BillCommands::Inquiry { product, customer } => {
                print_json(&client.prepaid_inquiry(&product, &customer).await?)?;
            }
            BillCommands::Pay { confirm } => {
                let id = parse_inquiry_id(&confirm.inquiry)?;
                print_json(&client.pay_prepaid(id, &confirm.pin, confirm.voucher).await?)?;
            }
        },

        Commands::Postpaid { action } => match action {
            BillCommands::Inquiry { product, customer } => {
                print_json(&client.postpaid_inquiry(&product, &customer).await?)?;
            }
            BillCommands::Pay { confirm } => {
                let id = parse_inquiry_id(&confirm.inquiry)?;
                print_json(&client.pay_postpaid(id, &confirm.pin, confirm.voucher).await?)?;
            }
        },

        Commands::Transfer { action } => match action {
            TransferCommands::Inquiry {
                bank_code,
                account,
                amount,
            } => {
                print_json(&client.transfer_inquiry(&bank_code, &account, amount).await?)?;
            }
            TransferCommands::Execute { confirm } => {
                let id = parse_inquiry_id(&confirm.inquiry)?;
                print_json(
                    &client
                        .transfer_execute(id, &confirm.pin, confirm.voucher)
                        .await?,
                )?;
            }
        },

        Commands::Status { id } => print_json(&client.status(&id).await?)?,

        Commands::Webhook { action } => match action {
            WebhookCommands::Sign { payload, secret } => {
                println!("{}", sign_webhook(payload.as_bytes(), &secret));
            }
            WebhookCommands::Send { payload, secret } => {
                let signature = sign_webhook(payload.as_bytes(), &secret);
                print_json(&client.deliver_webhook(payload, &signature).await?)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_virtual_account_needs_bank_code() {
        assert!(payment_method(Method::VirtualAccount, None, None).is_err());
        assert_eq!(
            payment_method(Method::VirtualAccount, Some("014".into()), None).unwrap(),
            PaymentMethod::VirtualAccount {
                bank_code: "014".into()
            }
        );
        assert_eq!(
            payment_method(Method::Qris, None, None).unwrap(),
            PaymentMethod::Qris
        );
    }

    #[test]
    fn test_parse_pay_command() {
        let cli = Cli::try_parse_from([
            "settlement",
            "--api-key",
            "sk_test",
            "prepaid",
            "pay",
            "--inquiry",
            "7f1d2c3a-0000-4000-8000-000000000001",
            "--pin",
            "123456",
        ])
        .unwrap();

        assert_eq!(cli.api_key.as_deref(), Some("sk_test"));
        match cli.command {
            Commands::Prepaid {
                action: BillCommands::Pay { confirm },
            } => {
                assert!(parse_inquiry_id(&confirm.inquiry).is_ok());
                assert!(confirm.voucher.is_none());
            }
            _ => panic!("expected prepaid pay"),
        }
    }
}
