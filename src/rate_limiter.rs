//! # Per-Chain RPC Throttling
//!
//! Every outbound RPC call funnels through a `ChainRateLimiter`: a governor
//! quota plus an optional concurrency semaphore, a hard per-call deadline,
//! and retry with exponential backoff and jitter on rate-limit-shaped
//! errors. The `RateLimiterRegistry` is an injected service constructed at
//! startup, one limiter per configured chain.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::Future;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use rand::Rng;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{PerChainConfig, RateLimiterSettings};
use crate::errors::RpcError;
use crate::metrics;

const RATE_LIMIT_ERRORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "exceeded",
    "429",
    "RateLimitError",
    "-32005",
    "You've exceeded the RPS limit",
];

/// True when an error string looks like provider throttling rather than a
/// genuine failure.
pub fn is_rate_limit_error(message: &str) -> bool {
    RATE_LIMIT_ERRORS.iter().any(|p| message.contains(p))
}

#[derive(Debug, Clone, Default)]
pub struct RpcCallMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub rate_limited_calls: u64,
    pub failed_calls: u64,
}

#[derive(Debug)]
pub struct ChainRateLimiter {
    chain: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    concurrency_limiter: Option<Arc<Semaphore>>,
    call_metrics: Arc<RwLock<RpcCallMetrics>>,
    settings: RateLimiterSettings,
}

impl ChainRateLimiter {
    pub fn new(
        chain: &str,
        rps_limit: Option<u32>,
        max_concurrent: Option<u32>,
        settings: RateLimiterSettings,
    ) -> Self {
        let rps = rps_limit.unwrap_or(settings.default_chain_rps).max(1);
        let burst = settings.burst_size.max(1);
        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));

        let concurrency_limiter = max_concurrent
            .filter(|m| *m > 0)
            .map(|m| Arc::new(Semaphore::new(m.min(50) as usize)));

        info!(
            chain = chain,
            rps_limit = rps,
            max_concurrent = ?max_concurrent,
            "Initialized chain rate limiter"
        );

        Self {
            chain: chain.to_string(),
            rate_limiter: Arc::new(GovernorRateLimiter::direct(quota)),
            concurrency_limiter,
            call_metrics: Arc::new(RwLock::new(RpcCallMetrics::default())),
            settings,
        }
    }

    /// Runs `call_fn` under the quota, the concurrency bound, and the
    /// per-call deadline, retrying rate-limit-shaped failures with backoff.
    /// Timeouts and other errors are not retried.
    pub async fn execute_rpc_call<F, Fut, T>(&self, method_name: &str, call_fn: F) -> Result<T, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let start_time = Instant::now();
        {
            let mut m = self.call_metrics.write().await;
            m.total_calls += 1;
        }

        let _permit = match &self.concurrency_limiter {
            Some(sem) => Some(
                sem.acquire()
                    .await
                    .map_err(|_| RpcError::Provider("concurrency semaphore closed".into()))?,
            ),
            None => None,
        };

        self.rate_limiter.until_ready().await;

        let deadline = Duration::from_millis(self.settings.rpc_timeout_ms);
        let mut attempt = 0u32;
        let mut last_error = None;

        while attempt < self.settings.max_retries.max(1) {
            if attempt > 0 {
                metrics::RPC_RETRIES.with_label_values(&[method_name]).inc();
            }
            attempt += 1;

            match timeout(deadline, call_fn()).await {
                Ok(Ok(result)) => {
                    let elapsed = start_time.elapsed();
                    let mut m = self.call_metrics.write().await;
                    m.successful_calls += 1;
                    drop(m);
                    metrics::RPC_LATENCY
                        .with_label_values(&[method_name])
                        .observe(elapsed.as_secs_f64());
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    let error_str = e.to_string();
                    if is_rate_limit_error(&error_str) && attempt < self.settings.max_retries {
                        let backoff = self.backoff_for(attempt);
                        warn!(
                            chain = %self.chain,
                            method = method_name,
                            attempt = attempt,
                            error = %error_str,
                            backoff_ms = backoff,
                            "Rate limit error, retrying with backoff"
                        );
                        {
                            let mut m = self.call_metrics.write().await;
                            m.rate_limited_calls += 1;
                        }
                        sleep(Duration::from_millis(backoff)).await;
                        last_error = Some(e);
                        continue;
                    }
                    debug!(
                        chain = %self.chain,
                        method = method_name,
                        attempt = attempt,
                        error = %error_str,
                        "RPC call failed (non-retryable or max attempts)"
                    );
                    let mut m = self.call_metrics.write().await;
                    m.failed_calls += 1;
                    return Err(e);
                }
                Err(_) => {
                    debug!(
                        chain = %self.chain,
                        method = method_name,
                        attempt = attempt,
                        "RPC call timed out (non-retryable)"
                    );
                    let mut m = self.call_metrics.write().await;
                    m.failed_calls += 1;
                    return Err(RpcError::Timeout(self.settings.rpc_timeout_ms));
                }
            }
        }

        {
            let mut m = self.call_metrics.write().await;
            m.failed_calls += 1;
        }
        Err(last_error
            .unwrap_or_else(|| RpcError::RateLimited("all retry attempts exhausted".into())))
    }

    fn backoff_for(&self, attempt: u32) -> u64 {
        let base = self.settings.backoff_base_ms.max(1);
        let exp = base.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        exp.saturating_add(jitter).min(self.settings.backoff_max_ms)
    }

    pub async fn get_metrics(&self) -> RpcCallMetrics {
        self.call_metrics.read().await.clone()
    }
}

/// Injected per-chain limiter table.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    limiters: DashMap<u64, Arc<ChainRateLimiter>>,
    settings: RateLimiterSettings,
}

impl RateLimiterRegistry {
    pub fn new(settings: RateLimiterSettings) -> Self {
        Self {
            limiters: DashMap::new(),
            settings,
        }
    }

    pub fn get_or_create(
        &self,
        chain_id: u64,
        chain_name: &str,
        rps_limit: Option<u32>,
        max_concurrent: Option<u32>,
    ) -> Arc<ChainRateLimiter> {
        if let Some(limiter) = self.limiters.get(&chain_id) {
            return limiter.clone();
        }
        let limiter = Arc::new(ChainRateLimiter::new(
            chain_name,
            rps_limit,
            max_concurrent,
            self.settings.clone(),
        ));
        self.limiters.insert(chain_id, limiter.clone());
        limiter
    }

    pub fn for_chain(&self, chain: &PerChainConfig) -> Arc<ChainRateLimiter> {
        self.get_or_create(
            chain.chain_id,
            &chain.chain_name,
            chain.rps_limit,
            chain.max_concurrent_requests,
        )
    }

    pub fn chain_count(&self) -> usize {
        self.limiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_settings() -> RateLimiterSettings {
        RateLimiterSettings {
            default_chain_rps: 1_000,
            burst_size: 100,
            rpc_timeout_ms: 500,
            max_retries: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        }
    }

    #[tokio::test]
    async fn retries_rate_limited_calls_until_success() {
        let limiter = ChainRateLimiter::new("testchain", Some(1_000), Some(4), fast_settings());
        let attempts = AtomicU32::new(0);
        let result = limiter
            .execute_rpc_call("test_method", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RpcError::Provider("429 too many requests".into()))
                    } else {
                        Ok(7u64)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_rate_limit_errors_fail_immediately() {
        let limiter = ChainRateLimiter::new("testchain", Some(1_000), None, fast_settings());
        let attempts = AtomicU32::new(0);
        let result: Result<u64, _> = limiter
            .execute_rpc_call("test_method", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(RpcError::Provider("execution reverted".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let limiter = ChainRateLimiter::new("testchain", Some(1_000), None, fast_settings());
        let attempts = AtomicU32::new(0);
        let result: Result<u64, _> = limiter
            .execute_rpc_call("test_method", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(RpcError::RateLimited("rate limit".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let m = limiter.get_metrics().await;
        assert_eq!(m.failed_calls, 1);
        assert_eq!(m.rate_limited_calls, 2);
    }

    #[tokio::test]
    async fn registry_reuses_chain_limiters() {
        let registry = RateLimiterRegistry::new(fast_settings());
        let a = registry.get_or_create(56, "bsc", Some(10), None);
        let b = registry.get_or_create(56, "bsc", Some(999), None);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.chain_count(), 1);
    }

    #[test]
    fn classifies_rate_limit_messages() {
        assert!(is_rate_limit_error("HTTP 429 returned"));
        assert!(is_rate_limit_error("error -32005: limit"));
        assert!(!is_rate_limit_error("execution reverted: K"));
    }
}
