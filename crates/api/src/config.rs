//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

use stockroom_infra::audit::{BackoffStrategy, RetryPolicy};

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres URL for products and movements. In-memory store when unset.
    pub database_url: Option<String>,
    /// Postgres URL for the audit log. In-memory store when unset.
    pub audit_database_url: Option<String>,
    pub audit_queue_capacity: usize,
    pub audit_max_attempts: u32,
    pub audit_retry_base: Duration,
    pub audit_backoff: BackoffStrategy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            audit_database_url: None,
            audit_queue_capacity: 1024,
            audit_max_attempts: 5,
            audit_retry_base: Duration::from_millis(200),
            audit_backoff: BackoffStrategy::Exponential,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BIND_ADDR must be host:port, got '{raw}'"))?,
            None => defaults.bind_addr,
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let audit_queue_capacity = parse_or(&get, "AUDIT_QUEUE_CAPACITY", defaults.audit_queue_capacity)?;
        if audit_queue_capacity == 0 {
            anyhow::bail!("AUDIT_QUEUE_CAPACITY must be greater than zero");
        }
        let audit_max_attempts = parse_or(&get, "AUDIT_MAX_ATTEMPTS", defaults.audit_max_attempts)?;
        let audit_retry_base = match get("AUDIT_RETRY_BASE_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("AUDIT_RETRY_BASE_MS must be milliseconds, got '{raw}'"))?,
            ),
            None => defaults.audit_retry_base,
        };
        let audit_backoff = match get("AUDIT_BACKOFF") {
            Some(raw) => parse_backoff(&raw)?,
            None => defaults.audit_backoff,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            audit_database_url: get("AUDIT_DATABASE_URL"),
            audit_queue_capacity,
            audit_max_attempts,
            audit_retry_base,
            audit_backoff,
        })
    }

    pub fn audit_retry_policy(&self) -> RetryPolicy {
        let attempts = self.audit_max_attempts;
        let base = self.audit_retry_base;
        let cap = RetryPolicy::default().max_delay.max(base);
        match self.audit_backoff {
            BackoffStrategy::Fixed => RetryPolicy::fixed(attempts, base),
            BackoffStrategy::Linear => RetryPolicy::linear(attempts, base, cap),
            BackoffStrategy::Exponential => RetryPolicy::exponential(attempts, base, cap),
        }
    }
}

fn parse_backoff(raw: &str) -> anyhow::Result<BackoffStrategy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "fixed" => Ok(BackoffStrategy::Fixed),
        "linear" => Ok(BackoffStrategy::Linear),
        "exponential" => Ok(BackoffStrategy::Exponential),
        other => anyhow::bail!("AUDIT_BACKOFF must be fixed, linear or exponential, got '{other}'"),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
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
    fn empty_environment_uses_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn values_override_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("AUDIT_DATABASE_URL", " "),
            ("AUDIT_QUEUE_CAPACITY", "8"),
            ("AUDIT_MAX_ATTEMPTS", "2"),
            ("AUDIT_RETRY_BASE_MS", "50"),
            ("AUDIT_BACKOFF", "Linear"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/stock"));
        assert!(config.audit_database_url.is_none());
        assert_eq!(config.audit_queue_capacity, 8);

        let policy = config.audit_retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.strategy, BackoffStrategy::Linear);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
    }

    #[test]
    fn default_policy_backs_off_exponentially() {
        let policy = AppConfig::default().audit_retry_policy();
        assert_eq!(policy.strategy, BackoffStrategy::Exponential);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(200));

        let fixed = AppConfig {
            audit_backoff: BackoffStrategy::Fixed,
            ..AppConfig::default()
        }
        .audit_retry_policy();
        assert_eq!(fixed.delay_for_attempt(1), fixed.delay_for_attempt(4));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("AUDIT_MAX_ATTEMPTS", "-1")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("AUDIT_QUEUE_CAPACITY", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("AUDIT_BACKOFF", "random")])).is_err());
    }
}
