use chrono::Duration;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/ticketing";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_PAYMENT_PROVIDER: &str = "mock";
const DEFAULT_RETURN_URL: &str = "http://localhost:3000/payments/complete";
const DEFAULT_PENDING_TTL_MINUTES: i64 = 30;
const DEV_WEBHOOK_SECRET: &str = "dev-webhook-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
}

/// Credentials for a hosted payment provider.
#[derive(Debug, Clone)]
pub struct PaymentApiConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub production: bool,
    pub cors_allowed_origins: Option<String>,
    pub payment_provider: String,
    pub payment_webhook_secret: String,
    pub payment_api: Option<PaymentApiConfig>,
    pub payment_return_url: String,
    pub pending_order_ttl: Duration,
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match var(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Config: {} has invalid value '{}', using {}", name, raw, default);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let production = var("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        let payment_webhook_secret = match var("PAYMENT_WEBHOOK_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("PAYMENT_WEBHOOK_SECRET")),
            None => {
                warn!("Config: PAYMENT_WEBHOOK_SECRET not set, using development secret");
                DEV_WEBHOOK_SECRET.to_string()
            }
        };

        let payment_api = match (var("PAYMENT_API_URL"), var("PAYMENT_API_KEY")) {
            (Some(url), Some(key)) => Some(PaymentApiConfig { url, key }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("Config: PAYMENT_API_URL and PAYMENT_API_KEY must be set together, using mock provider");
                None
            }
            (None, None) => None,
        };

        let ttl_minutes = parsed("PENDING_ORDER_TTL_MINUTES", DEFAULT_PENDING_TTL_MINUTES);
        let ttl_minutes = if ttl_minutes > 0 {
            ttl_minutes
        } else {
            warn!("Config: PENDING_ORDER_TTL_MINUTES must be positive, using {}", DEFAULT_PENDING_TTL_MINUTES);
            DEFAULT_PENDING_TTL_MINUTES
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            production,
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            payment_provider: var("PAYMENT_PROVIDER")
                .unwrap_or_else(|| DEFAULT_PAYMENT_PROVIDER.to_string()),
            payment_webhook_secret,
            payment_api,
            payment_return_url: var("PAYMENT_RETURN_URL")
                .unwrap_or_else(|| DEFAULT_RETURN_URL.to_string()),
            pending_order_ttl: Duration::minutes(ttl_minutes),
        })
    }
}
