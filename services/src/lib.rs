//! Shared startup plumbing for the Riskflow service binaries.
//!
//! Binaries build the components in dependency order — settings, log store,
//! bus, stores, workers — wire the shutdown signal, and exit with code 0 on
//! clean shutdown or 1 on a startup/runtime fatal error.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use riskflow_core::EventBus;
use riskflow_redis::RedisLogStore;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// A malformed environment value; startup-fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value '{value}' for {var}: {reason}")]
pub struct EnvError {
    /// The offending variable.
    pub var: String,
    /// The raw value.
    pub value: String,
    /// Why it failed to parse.
    pub reason: String,
}

/// Settings shared by every service.
#[derive(Debug, Clone)]
pub struct CoreSettings {
    /// Log store URL (`REDIS_URL`).
    pub redis_url: String,
    /// Approximate stream cap (`STREAM_MAX_LEN`, default 100 000).
    pub stream_max_len: u64,
    /// Idempotency marker TTL (`DEDUP_TTL_SECONDS`, default 86 400).
    pub dedup_ttl_seconds: u64,
    /// Retry-counter TTL (`RETRY_KEY_TTL_SECONDS`, default 3 600).
    pub retry_key_ttl_seconds: u64,
}

fn parsed_env<T>(var: &str, default: T) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|e| EnvError {
            var: var.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
    }
}

impl CoreSettings {
    /// Load from the environment; missing values fall back to defaults,
    /// malformed values fail fast.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError`] for any present-but-malformed value.
    pub fn from_env() -> Result<Self, EnvError> {
        Ok(Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            stream_max_len: parsed_env("STREAM_MAX_LEN", 100_000)?,
            dedup_ttl_seconds: parsed_env("DEDUP_TTL_SECONDS", 86_400)?,
            retry_key_ttl_seconds: parsed_env("RETRY_KEY_TTL_SECONDS", 3_600)?,
        })
    }
}

/// Install the tracing subscriber once per binary. Respects `RUST_LOG`,
/// defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Connect the shared log store and build the bus over it.
///
/// # Errors
///
/// Returns the store's connection error; the caller exits with code 1.
pub async fn connect_bus(
    settings: &CoreSettings,
) -> Result<EventBus, riskflow_core::store::StoreError> {
    let store = RedisLogStore::connect(&settings.redis_url).await?;
    Ok(EventBus::new(Arc::new(store)).with_stream_max_len(settings.stream_max_len))
}

/// The consumer name for this process: `HOSTNAME` when set, else a fixed
/// default (consumer names only need to be unique within a group per host).
#[must_use]
pub fn consumer_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "consumer-1".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        // These variables are absent in the test environment.
        let settings = CoreSettings::from_env().unwrap();
        assert_eq!(settings.stream_max_len, 100_000);
        assert_eq!(settings.dedup_ttl_seconds, 86_400);
        assert_eq!(settings.retry_key_ttl_seconds, 3_600);
    }
}
