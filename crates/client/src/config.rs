use std::time::Duration;

use crate::poller::PollerConfig;

/// Backend used when `CONVERT_API_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
const DEFAULT_STALL_THRESHOLD: u32 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const ENV_BASE_URL: &str = "CONVERT_API_BASE_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
pub const ENV_STALL_THRESHOLD: &str = "POLL_STALL_THRESHOLD";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend running locally.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the conversion backend, without a trailing slash.
    pub base_url: String,
    /// Interval between status polls (default: 1500 ms).
    pub poll_interval: Duration,
    /// Consecutive failed polls before a stall is reported (default: `10`).
    /// `0` disables stall reporting.
    pub stall_threshold: u32,
    /// Per-request HTTP timeout (default: 120 s).
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `CONVERT_API_BASE_URL`  | `http://localhost:8000` |
    /// | `POLL_INTERVAL_MS`      | `1500`                  |
    /// | `POLL_STALL_THRESHOLD`  | `10`                    |
    /// | `REQUEST_TIMEOUT_SECS`  | `120`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = match lookup(ENV_BASE_URL) {
            Some(url) => normalize_base_url(&url).ok_or(ConfigError::Empty { key: ENV_BASE_URL })?,
            None => defaults.base_url,
        };

        let poll_interval_ms: u64 =
            parse_var(&lookup, ENV_POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, "u64")?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_POLL_INTERVAL_MS,
                value: "0".to_string(),
                expected: "interval greater than zero",
            });
        }

        let stall_threshold: u32 =
            parse_var(&lookup, ENV_STALL_THRESHOLD, DEFAULT_STALL_THRESHOLD, "u32")?;

        let request_timeout_secs: u64 = parse_var(
            &lookup,
            ENV_REQUEST_TIMEOUT_SECS,
            DEFAULT_REQUEST_TIMEOUT_SECS,
            "u64",
        )?;

        Ok(Self {
            base_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            stall_threshold,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    /// Override the backend base URL (e.g. from a command-line flag).
    pub fn with_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(url).ok_or(ConfigError::Empty { key: ENV_BASE_URL })?;
        Ok(self)
    }

    /// Poller settings derived from this configuration.
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            stall_threshold: self.stall_threshold,
        }
    }
}

/// Trim whitespace and trailing slashes; `None` if nothing is left.
fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_var<F, T>(
    lookup: &F,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected,
        }),
    }
}

/// Errors raised while loading [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}
