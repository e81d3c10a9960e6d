// src/config/mod.rs
//! Process configuration from environment variables (`.env` is loaded by the
//! binaries via `dotenvy`). File-backed settings live next to their owners:
//! `scoring::config` and `config::providers`.

pub mod providers;

use crate::batch::BatchConfig;
use crate::pipeline::{FetchMode, PipelineConfig, ProcessOptions};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_CALL_TIMEOUT_MS: &str = "PIPELINE_CALL_TIMEOUT_MS";
pub const ENV_MAX_WAIT_MS: &str = "RATE_LIMIT_MAX_WAIT_MS";
pub const ENV_FETCH_MODE: &str = "PIPELINE_FETCH_MODE";
pub const ENV_BATCH_CONCURRENCY: &str = "BATCH_CONCURRENCY";
pub const ENV_BATCH_MAX_ATTEMPTS: &str = "BATCH_MAX_ATTEMPTS";
pub const ENV_BATCH_BASE_BACKOFF_MS: &str = "BATCH_BASE_BACKOFF_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub call_timeout: Duration,
    pub max_wait: Duration,
    pub fetch_mode: FetchMode,
    pub batch_concurrency: usize,
    pub batch_max_attempts: u32,
    pub batch_base_backoff: Duration,
    pub scoring_config_path: Option<PathBuf>,
    pub providers_config_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(10_000),
            max_wait: Duration::from_millis(2_000),
            fetch_mode: FetchMode::Sequential,
            batch_concurrency: 4,
            batch_max_attempts: 3,
            batch_base_backoff: Duration::from_millis(1_000),
            scoring_config_path: None,
            providers_config_path: None,
        }
    }
}

impl AppConfig {
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let fetch_mode = match env::var(ENV_FETCH_MODE) {
            Ok(v) if !v.trim().is_empty() => {
                FetchMode::from_str(&v).map_err(|e| anyhow!("{ENV_FETCH_MODE}: {e}"))?
            }
            _ => d.fetch_mode,
        };
        let cfg = Self {
            call_timeout: Duration::from_millis(env_or(ENV_CALL_TIMEOUT_MS, 10_000u64)?),
            max_wait: Duration::from_millis(env_or(ENV_MAX_WAIT_MS, 2_000u64)?),
            fetch_mode,
            batch_concurrency: env_or(ENV_BATCH_CONCURRENCY, d.batch_concurrency)?.max(1),
            batch_max_attempts: env_or(ENV_BATCH_MAX_ATTEMPTS, d.batch_max_attempts)?.max(1),
            batch_base_backoff: Duration::from_millis(env_or(ENV_BATCH_BASE_BACKOFF_MS, 1_000u64)?),
            scoring_config_path: env_path(crate::scoring::config::ENV_SCORING_CONFIG_PATH),
            providers_config_path: env_path(providers::ENV_PROVIDERS_CONFIG_PATH),
        };
        tracing::debug!(?cfg, "configuration loaded");
        Ok(cfg)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            call_timeout: self.call_timeout,
            max_wait: self.max_wait,
            fetch_mode: self.fetch_mode,
            reference_date: None,
        }
    }

    pub fn batch_config(&self, options: ProcessOptions) -> BatchConfig {
        BatchConfig {
            concurrency: self.batch_concurrency,
            max_attempts: self.batch_max_attempts,
            base_backoff: self.batch_base_backoff,
            options,
            ..BatchConfig::default()
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {name}={v}")),
        _ => Ok(default),
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
