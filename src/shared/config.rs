/// Runtime configuration for the enhancement queue and its client
///
/// Externalizes the intervals, retention windows, and rate limits so the
/// queue and poller stay configurable and testable. Values come from
/// `ENHANCER_*` environment variables (a `.env` file is honoured) with
/// production defaults for anything unset.
use crate::shared::errors::{AppError, AppResult};
use std::str::FromStr;
use std::time::Duration;

/// Server-side queue settings
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// How long a terminal item stays queryable before it is purged
    pub terminal_retention: Duration,
}

/// Token bucket in front of the step executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub requests_per_second: f64,
    pub burst_size: u32,
}

/// Client-side poller settings
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// Delay between observing a terminal state and clearing local state
    pub cleanup_delay: Duration,
    /// Consecutive transport failures tolerated before giving up
    pub max_consecutive_failures: u32,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementConfig {
    pub queue: QueueConfig,
    pub executor: ExecutorConfig,
    pub poller: PollerConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            terminal_retention: Duration::from_secs(300),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        // LLM endpoint: 30 req/min with a small burst
        Self {
            requests_per_second: 0.5,
            burst_size: 2,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2500),
            cleanup_delay: Duration::from_millis(3000),
            max_consecutive_failures: 5,
            base_url: "http://127.0.0.1:3000/api/enhancement".to_string(),
        }
    }
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancementConfig {
    /// Creates a new configuration with sensible production defaults
    pub fn new() -> Self {
        Self {
            queue: QueueConfig::default(),
            executor: ExecutorConfig::default(),
            poller: PollerConfig::default(),
        }
    }

    /// Load from the environment, falling back to defaults per key
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new();

        let config = Self {
            queue: QueueConfig {
                terminal_retention: parse_or(
                    &lookup,
                    "ENHANCER_TERMINAL_RETENTION_SECS",
                    defaults.queue.terminal_retention.as_secs(),
                )
                .map(Duration::from_secs)?,
            },
            executor: ExecutorConfig {
                requests_per_second: parse_or(
                    &lookup,
                    "ENHANCER_EXECUTOR_RPS",
                    defaults.executor.requests_per_second,
                )?,
                burst_size: parse_or(
                    &lookup,
                    "ENHANCER_EXECUTOR_BURST",
                    defaults.executor.burst_size,
                )?,
            },
            poller: PollerConfig {
                poll_interval: parse_or(
                    &lookup,
                    "ENHANCER_POLL_INTERVAL_MS",
                    defaults.poller.poll_interval.as_millis() as u64,
                )
                .map(Duration::from_millis)?,
                cleanup_delay: parse_or(
                    &lookup,
                    "ENHANCER_CLEANUP_DELAY_MS",
                    defaults.poller.cleanup_delay.as_millis() as u64,
                )
                .map(Duration::from_millis)?,
                max_consecutive_failures: parse_or(
                    &lookup,
                    "ENHANCER_MAX_POLL_FAILURES",
                    defaults.poller.max_consecutive_failures,
                )?,
                base_url: lookup("ENHANCER_BASE_URL").unwrap_or(defaults.poller.base_url),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> AppResult<()> {
        let rps = self.executor.requests_per_second;
        if rps.is_nan() || rps <= 0.0 {
            return Err(AppError::ConfigError(format!(
                "Executor rate must be positive, got {}",
                self.executor.requests_per_second
            )));
        }
        if Duration::try_from_secs_f64(1.0 / rps).is_err() {
            return Err(AppError::ConfigError(format!(
                "Executor rate {} is too small to schedule",
                rps
            )));
        }
        if self.executor.burst_size == 0 {
            return Err(AppError::ConfigError(
                "Executor burst size must be at least 1".to_string(),
            ));
        }
        if self.poller.poll_interval.is_zero() {
            return Err(AppError::ConfigError(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        if self.poller.max_consecutive_failures == 0 {
            return Err(AppError::ConfigError(
                "Max poll failures must be at least 1".to_string(),
            ));
        }
        if self.poller.base_url.trim().is_empty() {
            return Err(AppError::ConfigError("Base URL cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EnhancementConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.poller.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.poller.max_consecutive_failures, 5);
    }

    #[test]
    fn test_empty_lookup_yields_defaults() {
        let config = EnhancementConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EnhancementConfig::new());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = EnhancementConfig::from_lookup(lookup_from(&[
            ("ENHANCER_POLL_INTERVAL_MS", "1000"),
            ("ENHANCER_MAX_POLL_FAILURES", "3"),
            ("ENHANCER_EXECUTOR_RPS", "2.5"),
            ("ENHANCER_TERMINAL_RETENTION_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.poller.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.poller.max_consecutive_failures, 3);
        assert_eq!(config.executor.requests_per_second, 2.5);
        assert_eq!(config.queue.terminal_retention, Duration::from_secs(60));
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let err = EnhancementConfig::from_lookup(lookup_from(&[(
            "ENHANCER_POLL_INTERVAL_MS",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_zero_failures_rejected() {
        let err = EnhancementConfig::from_lookup(lookup_from(&[(
            "ENHANCER_MAX_POLL_FAILURES",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_vanishing_rate_rejected() {
        let err = EnhancementConfig::from_lookup(lookup_from(&[(
            "ENHANCER_EXECUTOR_RPS",
            "1e-20",
        )]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
