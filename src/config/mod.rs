//! Typed configuration from environment variables.
//!
//! Loads once at startup. Nothing here is re-read later, so changing a key
//! (the API key included) only takes effect after a restart. The API key and
//! database URL are wrapped in `secrecy::SecretString` to keep them out of logs.

use crate::error::{Error, Result};
use secrecy::SecretString;

/// Default destination for analytics calls.
pub const DEFAULT_BASE_URL: &str = "https://in.accoil.com/v1";

/// Default queue carrying analytics envelopes.
pub const DEFAULT_QUEUE: &str = "analytics";

#[derive(Debug)]
pub struct Config {
    /// Shared secret attached to every outgoing payload. Not validated locally.
    pub api_key: Option<SecretString>,
    /// Log payloads instead of sending them.
    pub debug: bool,
    /// Report every user under their group identifier.
    pub user_id_override: bool,
    pub base_url: String,
    pub queue_name: String,
    pub database_url: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).is_some_and(|v| is_true(&v));

        Self {
            api_key: lookup("ANALYTICS_API_KEY").map(SecretString::from),
            debug: flag("ANALYTICS_DEBUG"),
            // Older deployments set the misspelt key.
            user_id_override: match lookup("ANALYTICS_USER_ID_OVERRIDE") {
                Some(v) => is_true(&v),
                None => flag("ANALTYICS_USER_ID_OVERRIDE"),
            },
            base_url: lookup("ANALYTICS_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            queue_name: lookup("ANALYTICS_QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            database_url: lookup("DATABASE_URL").map(SecretString::from),
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Database URL, required only by the pgmq-backed queue.
    pub fn database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }
}

/// Boolean-like config values: case-insensitive "true" is on, anything else off.
pub fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}
