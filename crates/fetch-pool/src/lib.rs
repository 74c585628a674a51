use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod cache;
pub use cache::{FetchCache, MemoryFetchCache, SqliteFetchCache};

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The fetch itself failed. Shared verbatim with every caller that
    /// subscribed to the same in-flight attempt.
    #[error("fetch failed: {0}")]
    Fetch(Arc<anyhow::Error>),
    /// The response cache is unavailable. Unlike a fetch failure this is
    /// not retried by waiting for the next pass.
    #[error("fetch cache failed: {0}")]
    Cache(Arc<anyhow::Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

type InFlight<T> = Shared<BoxFuture<'static, Result<Option<T>>>>;

/// Pool is the concurrency gate in front of a data source: a memoizing,
/// dedup-by-key fetcher.
///
/// `get_or_fetch` first consults the response cache; on a miss it joins
/// any in-flight fetch for the same key, and only otherwise runs the
/// fetch itself, holding one of `max_concurrent` semaphore permits while
/// it does. Successful results are written back to the cache; a `None`
/// result means a transient failure and is intentionally not cached, so
/// a later frontier pass retries it. A timed-out fetch is equivalent to
/// `None`.
pub struct Pool<T: Clone + Send + Sync + 'static> {
    cache: Arc<dyn FetchCache<T>>,
    semaphore: Arc<tokio::sync::Semaphore>,
    timeout: Option<Duration>,
    in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Pool<T> {
    pub fn new(
        cache: Arc<dyn FetchCache<T>>,
        max_concurrent: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            cache,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent)),
            timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(key).await.map_err(cache_err)? {
            return Ok(Some(value));
        }

        // One short critical section decides between subscribing to an
        // in-flight fetch and starting a new one. The fetch itself is
        // spawned so it runs to completion (releasing its permit and
        // populating the cache) even if every subscriber is cancelled.
        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(key) {
                Some(shared) => shared.clone(),
                None => {
                    let task = tokio::spawn(run_fetch(
                        self.cache.clone(),
                        self.semaphore.clone(),
                        self.timeout,
                        self.in_flight.clone(),
                        key.to_string(),
                        fetch,
                    ));
                    let shared = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(join) => Err(Error::Fetch(Arc::new(anyhow::Error::new(join)))),
                        }
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        shared.await
    }
}

async fn run_fetch<T, F, Fut>(
    cache: Arc<dyn FetchCache<T>>,
    semaphore: Arc<tokio::sync::Semaphore>,
    timeout: Option<Duration>,
    in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
    key: String,
    fetch: F,
) -> Result<Option<T>>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let result = async {
        let _permit = semaphore.acquire().await.unwrap(); // Semaphore is never closed.

        // A fetch that completed while we waited for a permit has already
        // populated the cache.
        if let Some(value) = cache.get(&key).await.map_err(cache_err)? {
            return Ok(Some(value));
        }

        let fetched = match timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(%key, timeout = ?limit, "fetch timed out");
                    Ok(None)
                }
            },
            None => fetch().await,
        }
        .map_err(|err| Error::Fetch(Arc::new(err)))?;

        if let Some(value) = &fetched {
            cache.set(&key, value).await.map_err(cache_err)?;
        }
        Ok(fetched)
    }
    .await;

    // The entry must go away on every path, or the key could never be
    // fetched again after an error.
    in_flight.lock().unwrap().remove(&key);
    result
}

fn cache_err(err: anyhow::Error) -> Error {
    Error::Cache(Arc::new(err))
}
