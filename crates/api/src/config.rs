//! Application configuration loaded from environment variables.

use chrono::Duration;

/// Server and reservation configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `HOLD_TTL_MINUTES` — seat hold time-to-live (default: `10`)
/// - `ORDER_PENDING_MINUTES` — order pending window (default: `10`)
/// - `CLEANUP_INTERVAL_MINUTES` — sweep interval (default: `5`)
/// - `WEBHOOK_SECRET` — enables callback signature verification when set
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub hold_ttl_minutes: i64,
    pub order_pending_minutes: i64,
    pub cleanup_interval_minutes: u64,
    pub webhook_secret: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            hold_ttl_minutes: env_parse("HOLD_TTL_MINUTES", 10),
            order_pending_minutes: env_parse("ORDER_PENDING_MINUTES", 10),
            cleanup_interval_minutes: env_parse("CLEANUP_INTERVAL_MINUTES", 5),
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Hold time-to-live as a duration.
    pub fn hold_ttl(&self) -> Duration {
        Duration::minutes(self.hold_ttl_minutes.max(1))
    }

    /// Order pending window as a duration.
    pub fn pending_window(&self) -> Duration {
        Duration::minutes(self.order_pending_minutes.max(1))
    }

    /// Sweep interval as a std duration.
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_minutes.max(1) * 60)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            hold_ttl_minutes: 10,
            order_pending_minutes: 10,
            cleanup_interval_minutes: 5,
            webhook_secret: None,
        }
    }
}
