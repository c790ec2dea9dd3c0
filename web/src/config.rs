//! Gateway configuration from the environment.
//!
//! Every variable is optional with a documented default; a variable that is
//! *present but malformed* is a [`ConfigError`] and aborts startup.
//!
//! | Variable | Default |
//! |---|---|
//! | `{PREFIX}_HOST` | `127.0.0.1` |
//! | `{PREFIX}_PORT` | per service (`8090` signal, `8091` planning) |
//! | `{PREFIX}_MAX_REQUEST_BYTES` | `1048576` (1 MiB) |
//! | `{PREFIX}_MAX_SIGNALS_PER_REQUEST` (or `…_MAX_RECORDS_PER_REQUEST`) | `500` |
//! | `{PREFIX}_AUTH_TOKEN` | unset — no authentication |

use std::str::FromStr;
use thiserror::Error;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default request size cap: 1 MiB.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1_048_576;
/// Default batch size cap.
pub const DEFAULT_MAX_RECORDS_PER_REQUEST: usize = 500;

/// A malformed environment value; startup-fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    /// The offending variable.
    pub var: String,
    /// The raw value.
    pub value: String,
    /// Why it failed to parse.
    pub reason: String,
}

/// Runtime configuration of one gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request size cap, bytes; larger bodies are rejected with 413.
    pub max_request_bytes: usize,
    /// Batch size cap; larger batches are rejected with 422.
    pub max_records_per_request: usize,
    /// Static bearer token; `None` disables authentication.
    pub auth_token: Option<String>,
}

fn parsed<T>(var: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError {
            var: var.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
    }
}

impl GatewayConfig {
    /// Defaults with a service-specific port.
    #[must_use]
    pub fn with_defaults(default_port: u16) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: default_port,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_records_per_request: DEFAULT_MAX_RECORDS_PER_REQUEST,
            auth_token: None,
        }
    }

    /// Load from `{prefix}_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any present-but-malformed value.
    pub fn from_env(prefix: &str, default_port: u16) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, default_port, |var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup (tests inject a map here).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any present-but-malformed value.
    pub fn from_lookup(
        prefix: &str,
        default_port: u16,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::with_defaults(default_port);

        if let Some(host) = lookup(&format!("{prefix}_HOST")) {
            config.host = host;
        }

        let port_var = format!("{prefix}_PORT");
        if let Some(port) = parsed(&port_var, lookup(&port_var))? {
            config.port = port;
        }

        let bytes_var = format!("{prefix}_MAX_REQUEST_BYTES");
        if let Some(bytes) = parsed(&bytes_var, lookup(&bytes_var))? {
            config.max_request_bytes = bytes;
        }

        // Signal gateways cap "signals", planning gateways "records"; accept
        // either spelling.
        let signals_var = format!("{prefix}_MAX_SIGNALS_PER_REQUEST");
        let records_var = format!("{prefix}_MAX_RECORDS_PER_REQUEST");
        if let Some(cap) = parsed(&signals_var, lookup(&signals_var))? {
            config.max_records_per_request = cap;
        } else if let Some(cap) = parsed(&records_var, lookup(&records_var))? {
            config.max_records_per_request = cap;
        }

        if let Some(token) = lookup(&format!("{prefix}_AUTH_TOKEN")) {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }

        Ok(config)
    }

    /// The socket address string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
