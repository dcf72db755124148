use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::utils::RetryPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Database {
    Redis,
    Memory,
}

impl FromStr for Database {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Database::Redis),
            "memory" => Ok(Database::Memory),
            other => Err(format!("unknown database {other}, expected redis or memory")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database: Database,
    pub redis_url: String,
    /// Admin routes are disabled without it.
    pub admin_key: Option<String>,
    pub read_retries: u32,
    pub retry_backoff_ms: u64,
    pub leaderboard_limit: usize,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            database: try_load("DATABASE", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            admin_key: read_secret("ADMIN_KEY"),
            read_retries: try_load("READ_RETRIES", "3")?,
            retry_backoff_ms: try_load("RETRY_BACKOFF_MS", "50")?,
            leaderboard_limit: try_load("LEADERBOARD_LIMIT", "10")?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.read_retries.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
        .context("Environment misconfigured!")
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .or_else(|_| var(secret_name))
        .ok()
        .filter(|secret| !secret.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_parse() {
        assert_eq!("redis".parse::<Database>(), Ok(Database::Redis));
        assert_eq!("Memory".parse::<Database>(), Ok(Database::Memory));
        assert!("postgres".parse::<Database>().is_err());
    }

    #[test]
    fn test_default_applies_when_unset() {
        let port: u16 = try_load("PADDOCK_TEST_UNSET_PORT", "1111").unwrap();
        assert_eq!(port, 1111);
    }

    #[test]
    fn test_bad_default_is_an_error() {
        assert!(try_load::<u16>("PADDOCK_TEST_UNSET_PORT", "not-a-port").is_err());
    }
}
