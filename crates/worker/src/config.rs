//! Worker configuration

use std::env;
use std::time::Duration;

use supportly_api::email::EmailConfig;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    /// How often due jobs are claimed
    pub poll_interval: Duration,
    /// Upper bound on jobs claimed per poll
    pub batch_size: isize,
    /// Cron expression for the failed-list trim (seconds field first)
    pub trim_schedule: String,
    pub email: EmailConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        let poll_secs: u64 = env::var("WORKER_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| WorkerConfigError::Invalid("WORKER_POLL_INTERVAL_SECS"))?;
        if poll_secs == 0 {
            return Err(WorkerConfigError::Invalid("WORKER_POLL_INTERVAL_SECS"));
        }

        let batch_size: isize = env::var("WORKER_BATCH_SIZE")
            .unwrap_or_else(|_| "25".to_string())
            .parse()
            .map_err(|_| WorkerConfigError::Invalid("WORKER_BATCH_SIZE"))?;
        if batch_size <= 0 {
            return Err(WorkerConfigError::Invalid("WORKER_BATCH_SIZE"));
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| WorkerConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("WORKER_DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            poll_interval: Duration::from_secs(poll_secs),
            batch_size,
            trim_schedule: env::var("WORKER_TRIM_SCHEDULE")
                .unwrap_or_else(|_| "0 0 3 * * *".to_string()),
            email: EmailConfig::from_env(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup() {
        env::remove_var("DATABASE_URL");
        env::remove_var("WORKER_POLL_INTERVAL_SECS");
        env::remove_var("WORKER_BATCH_SIZE");
        env::remove_var("WORKER_TRIM_SCHEDULE");
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        cleanup();
        let result = WorkerConfig::from_env();
        assert!(matches!(result, Err(WorkerConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    #[serial]
    fn test_defaults() {
        cleanup();
        env::set_var("DATABASE_URL", "postgres://test");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.trim_schedule, "0 0 3 * * *");

        cleanup();
    }

    #[test]
    #[serial]
    fn test_zero_poll_interval_rejected() {
        cleanup();
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("WORKER_POLL_INTERVAL_SECS", "0");

        let result = WorkerConfig::from_env();
        assert!(matches!(
            result,
            Err(WorkerConfigError::Invalid("WORKER_POLL_INTERVAL_SECS"))
        ));

        cleanup();
    }
}
