use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::fetcher::{PoolOptions, DEFAULT_CONCURRENCY};
use crate::harvest::TerminationPolicy;
use crate::net::Retry;

pub const DEFAULT_BASE_URL: &str = "https://utahavalanchecenter.org";

/// Runtime settings. Defaults below, overridden by `UAC_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub max_pages: usize,
    pub retry_transient: bool,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_source(Environment::with_prefix("UAC").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("data_dir", "data")?
            .set_default("concurrency", DEFAULT_CONCURRENCY as i64)?
            .set_default("fetch_timeout_secs", 30i64)?
            .set_default("max_pages", 1000i64)?
            .set_default("retry_transient", false)?
            .set_default("max_retries", 3i64)?
            .set_default("backoff_ms", 2000i64)?
            .add_source(source)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry(&self) -> Retry {
        Retry {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    /// Pagination stops on the first failure unless `retry_transient` is set.
    pub fn policy(&self) -> TerminationPolicy {
        if self.retry_transient {
            TerminationPolicy::RetryTransient(self.retry())
        } else {
            TerminationPolicy::StopOnFirstFailure
        }
    }

    pub fn pool(&self) -> PoolOptions {
        PoolOptions {
            concurrency: self.concurrency,
            retry: self.retry(),
        }
    }
}
