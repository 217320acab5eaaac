//! Application configuration loaded from environment variables.

use std::time::Duration;

use messaging::ConsumerOptions;
use saga::{ReconcilerOptions, SagaOptions};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `INVENTORY_BASE_URL`: remote inventory service; in-process when unset
/// - `DEPENDENCY_TIMEOUT_MS`: per-call timeout (default: `5000`)
/// - `RECONCILE_INTERVAL_SECS`: reconciler period (default: `60`)
/// - `PENDING_ORDER_TTL_SECS`: age of an abandoned order (default: `300`)
/// - `CHANNEL_MAX_DELIVERIES`: deliveries before dead-lettering (default: `5`)
/// - `CHANNEL_RETRY_DELAY_MS`: redelivery delay (default: `200`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub inventory_base_url: Option<String>,
    pub dependency_timeout: Duration,
    pub reconcile_interval: Duration,
    pub pending_order_ttl: Duration,
    pub channel_max_deliveries: u32,
    pub channel_retry_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT") {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            inventory_base_url: non_empty("INVENTORY_BASE_URL"),
            dependency_timeout: Duration::from_millis(number("DEPENDENCY_TIMEOUT_MS", 5000)),
            reconcile_interval: Duration::from_secs(number("RECONCILE_INTERVAL_SECS", 60)),
            pending_order_ttl: Duration::from_secs(number("PENDING_ORDER_TTL_SECS", 300)),
            channel_max_deliveries: lookup("CHANNEL_MAX_DELIVERIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.channel_max_deliveries),
            channel_retry_delay: Duration::from_millis(number("CHANNEL_RETRY_DELAY_MS", 200)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_options(&self) -> SagaOptions {
        SagaOptions {
            dependency_timeout: self.dependency_timeout,
        }
    }

    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            interval: self.reconcile_interval,
            pending_ttl: self.pending_order_ttl,
            dependency_timeout: self.dependency_timeout,
        }
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            max_deliveries: self.channel_max_deliveries,
            retry_delay: self.channel_retry_delay,
            ..ConsumerOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            inventory_base_url: None,
            dependency_timeout: Duration::from_millis(5000),
            reconcile_interval: Duration::from_secs(60),
            pending_order_ttl: Duration::from_secs(300),
            channel_max_deliveries: 5,
            channel_retry_delay: Duration::from_millis(200),
        }
    }
}
