//! Process configuration from environment variables.
//!
//! | variable               | default          |
//! |------------------------|------------------|
//! | `LEDGERFLOW_BIND_ADDR` | `0.0.0.0:8080`   |
//! | `ACCOUNT_SERVICE_URL`  | unset: in-process validator |
//! | `VALIDATOR_TIMEOUT_MS` | `2000`           |
//! | `FUNDS_HOLD_TTL_SECS`  | `300`            |
//! | `LEDGER_MAX_ATTEMPTS`  | `5`              |
//! | `MUTATOR_MAX_RETRIES`  | `5`              |
//! | `MUTATOR_BACKOFF_MS`   | `100`            |
//! | `DATABASE_URL`         | unset            |
//! | `REDIS_URL`            | unset            |
//!
//! Postgres and Redis are used together: both URLs set selects the persistent
//! adapters (the binary must be built with the `persistent` feature), neither
//! runs in memory.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use ledgerflow_infra::RetryPolicy;
use ledgerflow_ledger::LedgerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub account_service_url: Option<String>,
    pub validator_timeout: Duration,
    pub hold_ttl: Duration,
    pub ledger_max_attempts: u32,
    pub mutator_max_retries: u32,
    pub mutator_backoff: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            account_service_url: None,
            validator_timeout: Duration::from_millis(2000),
            hold_ttl: Duration::from_secs(300),
            ledger_max_attempts: 5,
            mutator_max_retries: 5,
            mutator_backoff: Duration::from_millis(100),
            database_url: None,
            redis_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            bind_addr: parse_or(&get, "LEDGERFLOW_BIND_ADDR", defaults.bind_addr)?,
            account_service_url: get("ACCOUNT_SERVICE_URL"),
            validator_timeout: Duration::from_millis(parse_or(
                &get,
                "VALIDATOR_TIMEOUT_MS",
                defaults.validator_timeout.as_millis() as u64,
            )?),
            hold_ttl: Duration::from_secs(parse_or(
                &get,
                "FUNDS_HOLD_TTL_SECS",
                defaults.hold_ttl.as_secs(),
            )?),
            ledger_max_attempts: parse_or(&get, "LEDGER_MAX_ATTEMPTS", defaults.ledger_max_attempts)?
                .max(1),
            mutator_max_retries: parse_or(&get, "MUTATOR_MAX_RETRIES", defaults.mutator_max_retries)?,
            mutator_backoff: Duration::from_millis(parse_or(
                &get,
                "MUTATOR_BACKOFF_MS",
                defaults.mutator_backoff.as_millis() as u64,
            )?),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
        })
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        let ttl_secs = i64::try_from(self.hold_ttl.as_secs()).unwrap_or(i64::MAX);
        LedgerConfig {
            max_attempts: self.ledger_max_attempts,
            hold_ttl: chrono::Duration::seconds(ttl_secs),
        }
    }

    pub fn mutator_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.mutator_max_retries,
            self.mutator_backoff,
            Duration::from_secs(5),
        )
    }

    /// Postgres and Redis URLs, when both are configured.
    pub fn persistent_urls(&self) -> Option<(&str, &str)> {
        match (&self.database_url, &self.redis_url) {
            (Some(db), Some(redis)) => Some((db.as_str(), redis.as_str())),
            _ => None,
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
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
    fn empty_environment_yields_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.persistent_urls().is_none());
        assert_eq!(config.ledger_config().hold_ttl, chrono::Duration::minutes(5));
    }

    #[test]
    fn values_override_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("LEDGERFLOW_BIND_ADDR", "127.0.0.1:9000"),
            ("ACCOUNT_SERVICE_URL", "http://accounts:8080"),
            ("VALIDATOR_TIMEOUT_MS", "750"),
            ("FUNDS_HOLD_TTL_SECS", "60"),
            ("LEDGER_MAX_ATTEMPTS", "0"),
            ("DATABASE_URL", "postgres://localhost/ledgerflow"),
            ("REDIS_URL", " "),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.account_service_url.as_deref(), Some("http://accounts:8080"));
        assert_eq!(config.validator_timeout, Duration::from_millis(750));
        assert_eq!(config.ledger_config().hold_ttl, chrono::Duration::seconds(60));
        assert_eq!(config.ledger_max_attempts, 1);
        // Blank REDIS_URL is unset, so no persistent pair.
        assert!(config.persistent_urls().is_none());
    }

    #[test]
    fn unparsable_values_are_errors() {
        let err = Config::from_lookup(lookup(&[("MUTATOR_MAX_RETRIES", "many")])).unwrap_err();
        assert!(err.to_string().contains("MUTATOR_MAX_RETRIES"));
    }
}
