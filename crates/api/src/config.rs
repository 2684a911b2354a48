use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// HMAC secret used to sign access and refresh tokens.
    pub jwt_secret: String,
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,
    #[serde(default = "default_access_token_ttl_hours")]
    pub access_token_ttl_hours: i64,
    #[serde(default = "default_refresh_token_ttl_hours")]
    pub refresh_token_ttl_hours: i64,
    /// A refresh token with this many seconds or fewer left is rotated on refresh.
    #[serde(default = "default_refresh_renewal_secs")]
    pub refresh_renewal_secs: u64,
    /// Parent domain for the visitor cookie (e.g. "example.com").
    #[serde(default)]
    pub cookie_domain: String,
    /// Local hour at which pending page views are flushed to the database.
    #[serde(default = "default_flush_hour")]
    pub flush_hour: u32,
    #[serde(default = "default_flush_max_attempts")]
    pub flush_max_attempts: u32,
    #[serde(default = "default_flush_retry_delay_ms")]
    pub flush_retry_delay_ms: u64,
    /// Set to "production" for JSON logging, anything else for human-readable.
    #[serde(default)]
    pub env: String,
    /// Sentry DSN for error tracking
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

fn default_jwt_issuer() -> String {
    "jwt".to_string()
}

fn default_access_token_ttl_hours() -> i64 {
    2
}

fn default_refresh_token_ttl_hours() -> i64 {
    24 * 10
}

fn default_refresh_renewal_secs() -> u64 {
    24 * 60 * 60
}

fn default_flush_hour() -> u32 {
    3
}

fn default_flush_max_attempts() -> u32 {
    3
}

fn default_flush_retry_delay_ms() -> u64 {
    1000
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    /// Wall-clock time of the daily flush. Out-of-range hours fall back to 03:00.
    pub fn flush_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.flush_hour, 0, 0)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default())
    }

    pub fn flush_retry_delay(&self) -> Duration {
        Duration::from_millis(self.flush_retry_delay_ms)
    }
}
