use std::env;
use std::str::FromStr;

use crate::jobs::JobConfig;
use crate::workflows::step_execution::MAX_RETRY_COUNT;

#[derive(Debug, Clone)]
pub struct Config {
    /// In-memory storage is used when unset
    pub database_url: Option<String>,
    pub scheduler: JobConfig,
    pub execution_timeout_minutes: i64,
    pub max_step_retries: i32,
    pub retry_backoff_seconds: i64,
    pub webhook_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            scheduler: JobConfig::default(),
            execution_timeout_minutes: 1440,
            max_step_retries: MAX_RETRY_COUNT,
            retry_backoff_seconds: 60,
            webhook_timeout_seconds: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());

        Ok(Config {
            database_url,
            scheduler: JobConfig {
                tick_seconds: parse_var("WORKFLOW_TICK_SECONDS", defaults.scheduler.tick_seconds).max(1),
                timeout_sweep_minutes: parse_var(
                    "WORKFLOW_TIMEOUT_SWEEP_MINUTES",
                    defaults.scheduler.timeout_sweep_minutes,
                )
                .clamp(1, 59),
            },
            execution_timeout_minutes: parse_var(
                "WORKFLOW_EXECUTION_TIMEOUT_MINUTES",
                defaults.execution_timeout_minutes,
            )
            .max(1),
            max_step_retries: parse_var("WORKFLOW_MAX_STEP_RETRIES", defaults.max_step_retries)
                .clamp(0, MAX_RETRY_COUNT),
            retry_backoff_seconds: parse_var("WORKFLOW_RETRY_BACKOFF_SECONDS", defaults.retry_backoff_seconds)
                .max(0),
            webhook_timeout_seconds: parse_var(
                "WORKFLOW_WEBHOOK_TIMEOUT_SECONDS",
                defaults.webhook_timeout_seconds,
            ),
        })
    }

    pub fn uses_database(&self) -> bool {
        self.database_url.is_some()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
