use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::retry::RetryConfig;
use crate::worker_pool::PoolConfig;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,

    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_url: String,

    // Worker pool
    pub translation_concurrency: usize,
    pub item_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub run_timeout_secs: Option<u64>,

    // HTTP API
    pub api_key: Option<String>,
    pub port: u16,

    // Scheduled sweep of missing languages (6-field cron, UTC)
    pub missing_sweep_schedule: Option<String>,
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .ok()
            .with_context(|| format!("{} must be a number, got '{}'", name, value)),
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/translations.db".to_string()),

            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY not set")?,
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),

            translation_concurrency: parse_var("TRANSLATION_CONCURRENCY", 5)?,
            item_timeout_secs: parse_var("ITEM_TIMEOUT_SECS", 120)?,
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS", 3)?,
            retry_initial_delay_ms: parse_var("RETRY_INITIAL_DELAY_MS", 1000)?,
            run_timeout_secs: optional_var("RUN_TIMEOUT_SECS")
                .map(|v| {
                    v.parse()
                        .with_context(|| format!("RUN_TIMEOUT_SECS must be a number, got '{}'", v))
                })
                .transpose()?,

            api_key: optional_var("API_KEY"),
            port: parse_var("PORT", 8080)?,

            missing_sweep_schedule: optional_var("MISSING_SWEEP_SCHEDULE"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.translation_concurrency == 0 {
            bail!("TRANSLATION_CONCURRENCY must be at least 1");
        }
        if self.retry_max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.item_timeout_secs == 0 {
            bail!("ITEM_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            pool: PoolConfig {
                concurrency: self.translation_concurrency,
                item_timeout: Duration::from_secs(self.item_timeout_secs),
                retry: self.retry(),
            },
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
        }
    }
}
