use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use reqwest::Client;
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "logo-sync/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal failure after every attempt for `url` failed.
#[derive(Debug, Clone, Error)]
#[error("failed to fetch {url} after {attempts} attempts: {last_error}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Exponential backoff with additive jitter.
///
/// The delay before retry `n` (zero based) is
/// `backoff_factor * 2^n + uniform(0, max_jitter)`.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_factor: f64,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_factor: 1.0,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.retries.max(1)
    }

    /// Deterministic part of the delay before retry `attempt`. Saturates at
    /// `Duration::MAX` when the factor is too large to represent.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.min(30) as i32);
        Duration::try_from_secs_f64((self.backoff_factor * exp).max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt)
            .saturating_add(self.max_jitter.mul_f64(rand::random::<f64>()))
    }
}

/// Async transport used for the concurrent per-manufacturer fetches.
pub trait HttpGet {
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, String>> + Send;
}

/// Blocking transport used for the one-off catalog fetch.
pub trait BlockingHttpGet: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Run `op` until it succeeds or the policy's attempts are used up, awaiting
/// `sleep` between attempts.
pub async fn retry_async<T, Op, OpFut, S, SFut>(
    policy: &RetryPolicy,
    url: &str,
    mut op: Op,
    mut sleep: S,
) -> Result<T, FetchError>
where
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T, String>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let attempts = policy.attempts();
    let mut last_error = String::new();
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 < attempts {
                    let wait = policy.delay(attempt);
                    warn!(
                        "fetch: error reading {url}: {err}; retrying in {:.2}s",
                        wait.as_secs_f64()
                    );
                    sleep(wait).await;
                } else {
                    error!("fetch: error reading {url}: {err}; no more retries left");
                }
                last_error = err;
            }
        }
    }
    Err(FetchError {
        url: url.to_owned(),
        attempts,
        last_error,
    })
}

/// Blocking twin of [`retry_async`]; identical attempt and delay schedule.
pub fn retry_blocking<T, Op, S>(
    policy: &RetryPolicy,
    url: &str,
    mut op: Op,
    mut sleep: S,
) -> Result<T, FetchError>
where
    Op: FnMut() -> Result<T, String>,
    S: FnMut(Duration),
{
    let attempts = policy.attempts();
    let mut last_error = String::new();
    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 < attempts {
                    let wait = policy.delay(attempt);
                    warn!(
                        "fetch: error reading {url}: {err}; retrying in {:.2}s",
                        wait.as_secs_f64()
                    );
                    sleep(wait);
                } else {
                    error!("fetch: error reading {url}: {err}; no more retries left");
                }
                last_error = err;
            }
        }
    }
    Err(FetchError {
        url: url.to_owned(),
        attempts,
        last_error,
    })
}

/// Retrying fetcher over a shared async transport.
#[derive(Clone)]
pub struct Fetcher<C> {
    client: C,
    policy: RetryPolicy,
}

impl<C: HttpGet> Fetcher<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        retry_async(
            &self.policy,
            url,
            || self.client.get(url),
            tokio::time::sleep,
        )
        .await
    }
}

/// Retrying fetcher over a blocking transport.
pub struct BlockingFetcher<B> {
    client: B,
    policy: RetryPolicy,
}

impl<B: BlockingHttpGet> BlockingFetcher<B> {
    pub fn new(client: B, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        retry_blocking(&self.policy, url, || self.client.get(url), std::thread::sleep)
    }
}

impl<B: BlockingHttpGet + 'static> BlockingFetcher<B> {
    /// Run the blocking fetch on tokio's blocking pool.
    pub async fn fetch_off_runtime(self: Arc<Self>, url: String) -> Result<Vec<u8>, FetchError> {
        let join_url = url.clone();
        tokio::task::spawn_blocking(move || self.fetch(&url))
            .await
            .unwrap_or_else(|err| {
                Err(FetchError {
                    url: join_url,
                    attempts: 0,
                    last_error: format!("fetch task failed: {err}"),
                })
            })
    }
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }
}

impl HttpGet for NetworkClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("status error: {e}"))?;
        resp.bytes()
            .await
            .map(|body| body.to_vec())
            .map_err(|e| format!("body read error: {e}"))
    }
}

pub struct BlockingNetworkClient {
    client: reqwest::blocking::Client,
}

impl BlockingNetworkClient {
    /// Must be built and dropped outside of an async context.
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default blocking client ({err})");
                reqwest::blocking::Client::new()
            });
        Self { client }
    }
}

impl BlockingHttpGet for BlockingNetworkClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| format!("request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("status error: {e}"))?;
        resp.bytes()
            .map(|body| body.to_vec())
            .map_err(|e| format!("body read error: {e}"))
    }
}
