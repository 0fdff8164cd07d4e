//! Process configuration
//!
//! Every setting comes from an environment variable with a default.
//! Unset or empty variables take the default; a value that is set but
//! cannot be parsed fails startup instead of being silently replaced.

use std::time::Duration;
use thiserror::Error;

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Default drain deadline after a termination signal
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the one-shot placement lookup
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_millis(1000);

/// Link-local instance metadata endpoint for the availability zone
pub const DEFAULT_METADATA_URL: &str =
    "http://169.254.169.254/latest/meta-data/placement/availability-zone";

/// Environment variables consulted for the cluster name, highest priority first
pub const CLUSTER_ENV_CANDIDATES: [&str; 3] = ["ECS_CLUSTER", "CLUSTER_NAME", "K8S_CLUSTER"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub shutdown_timeout: Duration,
    pub metadata_url: String,
    pub metadata_timeout: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// - PORT: listen port (default: 3000)
    /// - SHUTDOWN_TIMEOUT_SECS: drain deadline in seconds (default: 30)
    /// - METADATA_URL: availability-zone endpoint (default: link-local IMDS)
    /// - METADATA_TIMEOUT_MS: lookup timeout in milliseconds (default: 1000)
    /// - RUST_LOG: log filter (default: info)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let port = match get("PORT") {
            Some(v) => parse_number::<u16>("PORT", &v)?,
            None => defaults.port,
        };

        let shutdown_timeout = match get("SHUTDOWN_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("SHUTDOWN_TIMEOUT_SECS", &v)?),
            None => defaults.shutdown_timeout,
        };

        let metadata_timeout = match get("METADATA_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(parse_number("METADATA_TIMEOUT_MS", &v)?),
            None => defaults.metadata_timeout,
        };

        Ok(Config {
            port,
            shutdown_timeout,
            metadata_url: get("METADATA_URL").unwrap_or(defaults.metadata_url),
            metadata_timeout,
            log_filter: get("RUST_LOG").unwrap_or(defaults.log_filter),
        })
    }
}

/// Machine host name: `/etc/hostname`, then `HOSTNAME`, then `"localhost"`
///
/// `/etc/hostname` holds the kernel host name on Linux hosts and in
/// containers; `HOSTNAME` is only consulted when it is exported.
pub fn resolve_hostname() -> String {
    pick_hostname(
        std::fs::read_to_string("/etc/hostname").ok(),
        std::env::var("HOSTNAME").ok(),
    )
}

fn pick_hostname(etc_hostname: Option<String>, env_hostname: Option<String>) -> String {
    let non_empty = |value: String| {
        let value = value.trim().to_string();
        (!value.is_empty()).then_some(value)
    };

    etc_hostname
        .and_then(non_empty)
        .or_else(|| env_hostname.and_then(non_empty))
        .unwrap_or_else(|| "localhost".to_string())
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
