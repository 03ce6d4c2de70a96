//! Environment configuration
//!
//! All settings are read once at startup and injected into the engines,
//! including the payment processor credentials. Nothing in the crate
//! reaches for a global client.

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub currency: String,
    pub stripe_secret_key: String,
    pub stripe_public_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub nats_url: Option<String>,
    /// How many past order ids a session remembers; oldest dropped first.
    pub session_order_history_max: usize,
    pub session_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8083".to_string())
                .parse()
                .context("PORT must be a number")?,
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "AUD".to_string()),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY")
                .context("STRIPE_SECRET_KEY is required")?,
            stripe_public_key: std::env::var("STRIPE_PUBLIC_KEY")
                .context("STRIPE_PUBLIC_KEY is required")?,
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .context("STRIPE_WEBHOOK_SECRET is required")?,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            nats_url: std::env::var("NATS_URL").ok(),
            session_order_history_max: std::env::var("SESSION_ORDER_HISTORY_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            session_ttl_days: std::env::var("SESSION_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
        })
    }
}
