use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::warn;

const USER_AGENT: &str = concat!("uac_scraper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cancelled before fetching {0}")]
    Cancelled(String),
}

impl FetchError {
    /// Worth retrying: the same request may succeed later. A 4xx answer is
    /// the site telling us the page does not exist.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Timeout(_) | FetchError::Transport { .. } => true,
            FetchError::Cancelled(_) => false,
        }
    }
}

/// Transport seam: one GET, body bytes back.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFetcher { client, timeout })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout(url.to_string()))?
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| FetchError::Timeout(url.to_string()))?
            .map_err(transport)?;
        Ok(body.to_vec())
    }
}

/// Retry schedule for transient failures: `backoff * 2^attempt` between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Retry {
    pub const NONE: Retry = Retry {
        max_retries: 0,
        backoff: Duration::ZERO,
    };
}

pub async fn fetch_with_retry<F: Fetch>(
    fetcher: &F,
    url: &str,
    retry: Retry,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url).await {
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                let backoff = retry.backoff * 2u32.pow(attempt);
                warn!(
                    "{} (attempt {}/{}), backing off {:.1}s",
                    e,
                    attempt + 1,
                    retry.max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
