//! Service configuration from environment variables.

use std::env;

use crate::error::{Error, Result};

/// Runtime configuration, loaded once at startup.
///
/// Upstream credentials are optional here and demanded lazily: a missing
/// credential only fails the sync pass that needs it, as `MissingConfig`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: String,

    /// Bind address for the HTTP server.
    pub bind_addr: String,

    /// Shared secret required on ETL trigger endpoints. When unset, the
    /// triggers are open (development mode).
    pub cron_secret: Option<String>,

    /// Records requested per upstream page.
    pub page_size: u32,

    /// Safety valve against runaway upstream pagination.
    pub max_pages: u32,

    /// WooCommerce store base URL, e.g. `https://shop.example.com`.
    pub woo_base_url: Option<String>,
    pub woo_consumer_key: Option<String>,
    pub woo_consumer_secret: Option<String>,

    /// Stripe secret API key (bearer token).
    pub stripe_secret_key: Option<String>,

    /// Meta Marketing API access token and ad account id (numeric part).
    pub meta_access_token: Option<String>,
    pub meta_ad_account_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MERCHFLOW_DB_PATH` (default: merchflow.db)
    /// - `MERCHFLOW_BIND_ADDR` (default: 127.0.0.1:8080)
    /// - `CRON_SECRET`
    /// - `ETL_PAGE_SIZE` (default: 100)
    /// - `ETL_MAX_PAGES` (default: 500)
    /// - `WOO_BASE_URL`, `WOO_CONSUMER_KEY`, `WOO_CONSUMER_SECRET`
    /// - `STRIPE_SECRET_KEY`
    /// - `META_ACCESS_TOKEN`, `META_AD_ACCOUNT_ID`
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("MERCHFLOW_DB_PATH").unwrap_or_else(|_| "merchflow.db".to_string()),

            bind_addr: env::var("MERCHFLOW_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),

            cron_secret: env::var("CRON_SECRET").ok().filter(|s| !s.is_empty()),

            page_size: env::var("ETL_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),

            max_pages: env::var("ETL_MAX_PAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),

            woo_base_url: env::var("WOO_BASE_URL").ok(),
            woo_consumer_key: env::var("WOO_CONSUMER_KEY").ok(),
            woo_consumer_secret: env::var("WOO_CONSUMER_SECRET").ok(),

            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),

            meta_access_token: env::var("META_ACCESS_TOKEN").ok(),
            meta_ad_account_id: env::var("META_AD_ACCOUNT_ID").ok(),
        }
    }
}

/// Demand an optional config field, naming the env var on failure.
pub fn require<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str> {
    value.as_deref().ok_or(Error::MissingConfig(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_present() {
        let v = Some("sk_test_123".to_string());
        assert_eq!(require(&v, "STRIPE_SECRET_KEY").unwrap(), "sk_test_123");
    }

    #[test]
    fn test_require_absent_names_key() {
        let v: Option<String> = None;
        match require(&v, "STRIPE_SECRET_KEY") {
            Err(Error::MissingConfig(key)) => assert_eq!(key, "STRIPE_SECRET_KEY"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
