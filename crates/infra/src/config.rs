//! Store configuration.

use std::str::FromStr;
use std::time::Duration;

use assessor_core::RetryPolicy;

pub const ENV_DATABASE_URL: &str = "ASSESSOR_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "ASSESSOR_MAX_CONNECTIONS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "ASSESSOR_BUSY_TIMEOUT_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "ASSESSOR_POLL_INTERVAL_MS";
pub const ENV_MAX_RETRIES: &str = "ASSESSOR_MAX_RETRIES";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "ASSESSOR_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "ASSESSOR_RETRY_MAX_DELAY_MS";
pub const ENV_RETRY_MULTIPLIER: &str = "ASSESSOR_RETRY_MULTIPLIER";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Assessment store configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// SQLite URL, e.g. `sqlite:///var/lib/assessor/assessments.db`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before giving up
    pub busy_timeout: Duration,
    /// Re-read interval for `wait_for_completion`
    pub poll_interval: Duration,
    /// Window counted as "recent" by the statistics view
    pub recent_window: Duration,
    pub default_max_retries: u32,
    pub default_timeout_seconds: u32,
    pub retry_policy: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://assessments.db".to_string(),
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
            recent_window: Duration::from_secs(24 * 60 * 60),
            default_max_retries: 3,
            default_timeout_seconds: 300,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    /// Load from `ASSESSOR_*` environment variables; unset keys keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup(ENV_DATABASE_URL) {
            cfg.database_url = url;
        }
        if let Some(n) = parse::<u32, _>(&lookup, ENV_MAX_CONNECTIONS)? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_MAX_CONNECTIONS,
                    value: n.to_string(),
                    reason: "must be > 0".to_string(),
                });
            }
            cfg.max_connections = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_BUSY_TIMEOUT_MS)? {
            cfg.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_POLL_INTERVAL_MS)? {
            cfg.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(n) = parse::<u32, _>(&lookup, ENV_MAX_RETRIES)? {
            cfg.default_max_retries = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_RETRY_BASE_DELAY_MS)? {
            cfg.retry_policy.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_RETRY_MAX_DELAY_MS)? {
            cfg.retry_policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(m) = parse::<f64, _>(&lookup, ENV_RETRY_MULTIPLIER)? {
            if !m.is_finite() || m < 1.0 {
                return Err(ConfigError::Invalid {
                    key: ENV_RETRY_MULTIPLIER,
                    value: m.to_string(),
                    reason: "must be a finite number >= 1.0".to_string(),
                });
            }
            cfg.retry_policy.multiplier = m;
        }

        Ok(cfg)
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent_window = window;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, StoreConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = StoreConfig::from_lookup(lookup(&[
            (ENV_DATABASE_URL, "sqlite:///tmp/a.db"),
            (ENV_MAX_CONNECTIONS, "2"),
            (ENV_POLL_INTERVAL_MS, "50"),
            (ENV_MAX_RETRIES, "5"),
            (ENV_RETRY_BASE_DELAY_MS, "1000"),
            (ENV_RETRY_MULTIPLIER, "1.5"),
        ]))
        .unwrap();

        assert_eq!(cfg.database_url, "sqlite:///tmp/a.db");
        assert_eq!(cfg.max_connections, 2);
        assert_eq!(cfg.poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.default_max_retries, 5);
        assert_eq!(cfg.retry_policy.base_delay, Duration::from_secs(1));
        assert_eq!(cfg.retry_policy.multiplier, 1.5);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[(ENV_MAX_RETRIES, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_MAX_RETRIES, .. }));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_MAX_CONNECTIONS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_MAX_CONNECTIONS, .. }));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_RETRY_MULTIPLIER, "0.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_RETRY_MULTIPLIER, .. }));
    }
}
