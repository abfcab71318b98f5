use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Number of independent worker loops
    pub worker_count: usize,
    pub worker_poll_interval: Duration,
    pub worker_poll_jitter: Duration,
    /// Claim attempts before a failed job stays failed
    pub job_max_attempts: i32,
    pub job_retry_base_delay: Duration,
    pub job_retry_max_delay: Duration,
    /// How long a job may stay running before the sweeper presumes its worker dead
    pub job_lease_timeout: Duration,
    pub stale_sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            worker_count: parse_var("WORKER_COUNT", 4)?,
            worker_poll_interval: Duration::from_millis(parse_var("WORKER_POLL_INTERVAL_MS", 1000)?),
            worker_poll_jitter: Duration::from_millis(parse_var("WORKER_POLL_JITTER_MS", 100)?),
            job_max_attempts: parse_var("JOB_MAX_ATTEMPTS", 3)?,
            job_retry_base_delay: Duration::from_secs(parse_var("JOB_RETRY_BASE_DELAY_SECS", 2)?),
            job_retry_max_delay: Duration::from_secs(parse_var("JOB_RETRY_MAX_DELAY_SECS", 3600)?),
            job_lease_timeout: Duration::from_secs(parse_var("JOB_LEASE_TIMEOUT_SECS", 900)?),
            stale_sweep_interval: Duration::from_secs(parse_var("STALE_SWEEP_INTERVAL_SECS", 60)?),
        })
    }
}

/// Read an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let value: u64 = parse_var("LEADGEN_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_var_reads_and_trims_value() {
        env::set_var("LEADGEN_TEST_WORKER_COUNT", " 7 ");
        let value: usize = parse_var("LEADGEN_TEST_WORKER_COUNT", 1).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn parse_var_rejects_non_numbers() {
        env::set_var("LEADGEN_TEST_BAD_NUMBER", "lots");
        let err = parse_var::<u32>("LEADGEN_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("LEADGEN_TEST_BAD_NUMBER"));
    }
}
