use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use crate::net::{fetch_with_retry, Fetch, FetchError, Retry};

pub const DEFAULT_CONCURRENCY: usize = 10;

/// A page that could not be fetched or extracted, keyed by its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub extension: String,
    pub error: String,
}

/// Per-item results of a batch. One bad page never sinks the rest.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub items: Vec<T>,
    pub errors: Vec<ItemError>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        BatchOutcome {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub concurrency: usize,
    pub retry: Retry,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            concurrency: DEFAULT_CONCURRENCY,
            retry: Retry::NONE,
        }
    }
}

pub fn join_url(base_url: &str, extension: &str) -> String {
    if extension.starts_with("http://") || extension.starts_with("https://") {
        return extension.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        extension.trim_start_matches('/')
    )
}

/// Fetch every extension with at most `concurrency` requests in flight.
///
/// Results come back in input order. Once `cancel` flips to true, pages that
/// have not started yet resolve to `FetchError::Cancelled`.
pub async fn fetch_all<F: Fetch + 'static>(
    fetcher: Arc<F>,
    base_url: &str,
    extensions: Vec<String>,
    opts: PoolOptions,
    cancel: watch::Receiver<bool>,
) -> Vec<(String, Result<Vec<u8>, FetchError>)> {
    let total = extensions.len();
    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    // Workers send (index, result); the loop below puts them back in order.
    let (tx, mut rx) =
        tokio::sync::mpsc::channel::<(usize, Result<Vec<u8>, FetchError>)>(opts.concurrency.max(1) * 2);

    for (index, extension) in extensions.iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let cancel = cancel.clone();
        let url = join_url(base_url, extension);
        let retry = opts.retry;

        tokio::spawn(async move {
            let result = match sem.acquire_owned().await {
                Ok(_permit) => {
                    let cancelled = *cancel.borrow();
                    if cancelled {
                        Err(FetchError::Cancelled(url))
                    } else {
                        fetch_with_retry(&*fetcher, &url, retry).await
                    }
                }
                Err(_) => Err(FetchError::Cancelled(url)),
            };
            let _ = tx.send((index, result)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut slots: Vec<Option<Result<Vec<u8>, FetchError>>> = (0..total).map(|_| None).collect();
    let mut errors = 0usize;
    while let Some((index, result)) = rx.recv().await {
        if let Err(e) = &result {
            warn!("Fetch failed for {}: {}", extensions[index], e);
            errors += 1;
        }
        slots[index] = Some(result);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, total - errors, errors);

    extensions
        .into_iter()
        .zip(slots)
        .map(|(extension, slot)| {
            // a worker that panicked never reports back
            let result = slot.unwrap_or_else(|| {
                Err(FetchError::Cancelled(join_url(base_url, &extension)))
            });
            (extension, result)
        })
        .collect()
}
