//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use settlement_hex::{ProviderConfig, SettlementConfig};
use settlement_types::Money;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rate_limit_per_minute: u32,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,
    /// OTLP collector; telemetry export is off when unset
    pub otlp_endpoint: Option<String>,
    pub settlement: SettlementConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
        };

        let port = parse_or(&get, "PORT", 3000)?;
        let database_url = required("DATABASE_URL")?;
        let rate_limit_per_minute = parse_or(&get, "RATE_LIMIT_PER_MINUTE", 100)?;
        let log_json = get("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));
        let otlp_endpoint = get("OTEL_EXPORTER_OTLP_ENDPOINT");

        let defaults = SettlementConfig::default();
        let settlement = SettlementConfig {
            inquiry_ttl: chrono::Duration::seconds(parse_or(
                &get,
                "INQUIRY_TTL_SECS",
                defaults.inquiry_ttl.num_seconds(),
            )?),
            deposit_ttl: chrono::Duration::seconds(parse_or(
                &get,
                "DEPOSIT_TTL_SECS",
                defaults.deposit_ttl.num_seconds(),
            )?),
            provider_timeout: Duration::from_secs(parse_or(
                &get,
                "PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout.as_secs(),
            )?),
            min_deposit: Money::new(parse_or(
                &get,
                "MIN_DEPOSIT",
                defaults.min_deposit.amount(),
            )?)?,
            webhook_secret: required("WEBHOOK_SECRET")?,
            sweep_interval: Duration::from_secs(parse_or(
                &get,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            stuck_processing_after: chrono::Duration::seconds(parse_or(
                &get,
                "STUCK_PROCESSING_AFTER_SECS",
                defaults.stuck_processing_after.num_seconds(),
            )?),
        };
        if settlement.inquiry_ttl <= chrono::Duration::zero()
            || settlement.deposit_ttl <= chrono::Duration::zero()
        {
            anyhow::bail!("INQUIRY_TTL_SECS and DEPOSIT_TTL_SECS must be positive");
        }
        if settlement.sweep_interval.is_zero() {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be positive");
        }

        let provider = ProviderConfig {
            base_url: required("PROVIDER_BASE_URL")?,
            client_id: required("PROVIDER_CLIENT_ID")?,
            credential: required("PROVIDER_CREDENTIAL")?,
            // The HTTP client gives up a little after the service-level bound.
            timeout: settlement.provider_timeout + Duration::from_secs(1),
        };

        Ok(Self {
            port,
            database_url,
            rate_limit_per_minute,
            log_json,
            otlp_endpoint,
            settlement,
            provider,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}={}: {}", key, raw, e)),
        None => Ok(default),
    }
}
