//! Rate limiting and retry policy shared by every provider call path.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::types::Provider;
use crate::error::{Error, Result};
use tracing::warn;

fn default_provider_rate_limits() -> HashMap<Provider, u32> {
    #[allow(unused_mut)]
    let mut limits = HashMap::from([(Provider::Anthropic, 60), (Provider::OpenAI, 60)]);
    #[cfg(feature = "gemini")]
    limits.insert(Provider::Google, 60);
    limits
}

#[derive(Debug, Clone, Copy)]
struct ProviderWindowState {
    window_start: Instant,
    used: u32,
}

/// Per-provider token-bucket rate limiter. Callers suspend on bucket
/// exhaustion up to the remainder of the current window.
pub struct ProviderRateLimiter {
    limits: HashMap<Provider, u32>,
    window: Duration,
    state: Mutex<HashMap<Provider, ProviderWindowState>>,
}

impl ProviderRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            limits: default_provider_rate_limits(),
            window,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(limits: HashMap<Provider, u32>, window: Duration) -> Self {
        Self {
            limits,
            window,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Build a limiter from `Config`'s `provider_rate_limit_per_window` /
    /// `provider_rate_limit_window_secs`, applied uniformly to every known
    /// provider (callers with per-provider plans should use
    /// [`Self::with_limits`] directly instead).
    pub fn from_config(config: &crate::config::Config) -> Self {
        let limit = config.provider_rate_limit_per_window;
        let mut limits = default_provider_rate_limits();
        for value in limits.values_mut() {
            *value = limit;
        }
        Self {
            limits,
            window: Duration::from_secs(config.provider_rate_limit_window_secs),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Suspend the caller on bucket exhaustion for up to one window's
    /// remainder; if the bucket is still exhausted after that bounded wait,
    /// fail with `Error::rate_limited` rather than suspending indefinitely
    /// (§4.3 "callers suspend on bucket exhaustion up to a bounded wait,
    /// then fail with `RateLimited`").
    pub async fn acquire(&self, provider: Provider) -> Result<()> {
        let limit = match self.limits.get(&provider).copied() {
            Some(limit) if limit > 0 => limit,
            _ => return Ok(()),
        };

        let mut waited_once = false;
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let entry = state.entry(provider).or_insert(ProviderWindowState {
                    window_start: Instant::now(),
                    used: 0,
                });

                let elapsed = entry.window_start.elapsed();
                if elapsed >= self.window {
                    entry.window_start = Instant::now();
                    entry.used = 0;
                }

                if entry.used < limit {
                    entry.used += 1;
                    None
                } else {
                    Some(self.window.saturating_sub(elapsed))
                }
            };

            match wait {
                Some(wait) => {
                    if waited_once {
                        warn!(?provider, "rate limit still exhausted after bounded wait");
                        return Err(Error::rate_limited(format!(
                            "{provider:?} rate limit exhausted after a bounded wait"
                        )));
                    }
                    waited_once = true;
                    sleep(wait).await;
                }
                None => return Ok(()),
            }
        }
    }
}

/// Exponential backoff retry policy for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_seconds: Vec<u64>,
}

impl RetryConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_attempts: config.provider_retry_attempts,
            backoff_seconds: config.provider_retry_backoff_seconds.clone(),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.backoff_seconds.len().saturating_sub(1));
        let secs = self.backoff_seconds.get(idx).copied().unwrap_or(1);
        Duration::from_secs(secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: vec![1, 2, 4],
        }
    }
}

/// Runs `call` with exponential-backoff retries on transient errors, giving
/// up after `retry.max_attempts` total attempts. Non-transient errors are
/// returned immediately without retrying.
pub async fn with_retry<F, Fut, T>(retry: &RetryConfig, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < retry.max_attempts => {
                warn!(attempt, error = %err, "transient provider error, retrying after backoff");
                sleep(retry.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
