//! # On-Chain Quote Verification
//!
//! Confirms that a candidate path actually yields nonzero output by calling
//! the venue router's read-only `getAmountsOut`. A liquidity-shaped revert or
//! a zero final amount triggers the probe-and-scale ladder instead of a hard
//! failure; transport failures propagate so callers can tell "no route" from
//! "provider unavailable". Results, including negative ones, sit in a short
//! TTL cache because the finder stages re-probe the same candidates.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use futures::future::join_all;
use moka::future::Cache;
use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::config::VerifierSettings;
use crate::errors::{RpcError, VerifierError};
use crate::metrics;
use crate::providers::ProviderFactory;
use crate::rate_limiter::RateLimiterRegistry;
use crate::registry::{DexRegistry, TokenRegistry};
use crate::scaling::{scale_probe_output, ProbeLadder};
use crate::types::{format_path, has_adjacent_duplicates, TokenPath, VerifiedRoute};

/// Revert substrings that mean "this pool cannot serve this amount" rather
/// than a broken provider. Covers UniswapV2-lineage routers.
const LIQUIDITY_ERRORS: &[&str] = &[
    "INSUFFICIENT_LIQUIDITY",
    "INSUFFICIENT_OUTPUT_AMOUNT",
    "INSUFFICIENT_INPUT_AMOUNT",
    "INSUFFICIENT_A_AMOUNT",
    "INSUFFICIENT_B_AMOUNT",
    "UniswapV2: K",
    "Pancake: K",
    "ds-math-sub-underflow",
    "execution reverted",
];

/// True when a call error looks like a liquidity rejection the ladder can
/// work around.
pub fn is_liquidity_error(message: &str) -> bool {
    LIQUIDITY_ERRORS.iter().any(|p| message.contains(p))
}

static GET_AMOUNTS_OUT_SELECTOR: Lazy<[u8; 4]> =
    Lazy::new(|| ethers::utils::id("getAmountsOut(uint256,address[])"));

/// Why a single pricing probe failed.
#[derive(Error, Debug)]
pub enum ProbeFailure {
    /// The venue rejected the amount; a smaller probe may still succeed.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),
    /// Genuine transport trouble, unrelated to pool reserves.
    #[error(transparent)]
    Transport(#[from] RpcError),
}

/// Read-only pricing call against a venue router. The production
/// implementation issues an `eth_call`; tests script this seam.
#[async_trait]
pub trait AmountsOutProbe: Send + Sync + fmt::Debug {
    async fn amounts_out(
        &self,
        chain_id: u64,
        router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, ProbeFailure>;
}

/// Production probe: manual `getAmountsOut` calldata through the cached
/// provider and the chain's rate limiter.
pub struct RpcAmountsOutProbe {
    providers: Arc<ProviderFactory>,
    limiters: Arc<RateLimiterRegistry>,
    tokens: Arc<TokenRegistry>,
}

impl fmt::Debug for RpcAmountsOutProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcAmountsOutProbe").finish_non_exhaustive()
    }
}

impl RpcAmountsOutProbe {
    pub fn new(
        providers: Arc<ProviderFactory>,
        limiters: Arc<RateLimiterRegistry>,
        tokens: Arc<TokenRegistry>,
    ) -> Self {
        Self {
            providers,
            limiters,
            tokens,
        }
    }

    fn encode_call(amount_in: U256, path: &[Address]) -> Bytes {
        let args = abi::encode(&[
            Token::Uint(amount_in),
            Token::Array(path.iter().map(|a| Token::Address(*a)).collect()),
        ]);
        let mut data = Vec::with_capacity(4 + args.len());
        data.extend_from_slice(&GET_AMOUNTS_OUT_SELECTOR[..]);
        data.extend_from_slice(&args);
        Bytes::from(data)
    }

    fn decode_amounts(raw: &[u8]) -> Result<Vec<U256>, RpcError> {
        let tokens = abi::decode(&[ParamType::Array(Box::new(ParamType::Uint(256)))], raw)
            .map_err(|e| RpcError::Provider(format!("getAmountsOut decode failed: {e}")))?;
        let Some(Token::Array(items)) = tokens.into_iter().next() else {
            return Err(RpcError::Provider(
                "getAmountsOut returned no amounts array".into(),
            ));
        };
        items
            .into_iter()
            .map(|t| match t {
                Token::Uint(v) => Ok(v),
                other => Err(RpcError::Provider(format!(
                    "unexpected token in amounts array: {other:?}"
                ))),
            })
            .collect()
    }
}

#[async_trait]
impl AmountsOutProbe for RpcAmountsOutProbe {
    async fn amounts_out(
        &self,
        chain_id: u64,
        router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, ProbeFailure> {
        let provider = self.providers.get(chain_id).map_err(ProbeFailure::Transport)?;
        let chain_name = self
            .tokens
            .chain_name(chain_id)
            .unwrap_or("unknown")
            .to_string();
        let limiter = self.limiters.get_or_create(chain_id, &chain_name, None, None);
        let calldata = Self::encode_call(amount_in, path);

        let result = limiter
            .execute_rpc_call("getAmountsOut", || {
                let provider = provider.clone();
                let tx = TransactionRequest::new().to(router).data(calldata.clone());
                async move {
                    provider
                        .call(&tx.into(), None)
                        .await
                        .map_err(|e| RpcError::Provider(e.to_string()))
                }
            })
            .await;

        match result {
            Ok(raw) => Self::decode_amounts(&raw).map_err(ProbeFailure::Transport),
            Err(e) => {
                let message = e.to_string();
                if is_liquidity_error(&message) {
                    Err(ProbeFailure::InsufficientLiquidity(message))
                } else {
                    Err(ProbeFailure::Transport(e))
                }
            }
        }
    }
}

/// One entry in a `verify_many` batch.
#[derive(Debug, Clone)]
pub struct VerifyCandidate {
    pub path: TokenPath,
    pub chain_id: u64,
    pub dex_id: String,
    pub amount_in: U256,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct VerifyKey {
    chain_id: u64,
    dex_id: String,
    path: Vec<Address>,
    amount_in: U256,
}

/// Verifies candidate paths against venue routers, with the scaling fallback,
/// a shared concurrency bound, and a TTL result cache.
pub struct QuoteVerifier {
    probe: Arc<dyn AmountsOutProbe>,
    dexs: Arc<DexRegistry>,
    cache: Cache<VerifyKey, Option<VerifiedRoute>>,
    semaphore: Arc<Semaphore>,
    ladder: ProbeLadder,
}

impl QuoteVerifier {
    pub fn new(
        probe: Arc<dyn AmountsOutProbe>,
        dexs: Arc<DexRegistry>,
        settings: &VerifierSettings,
    ) -> Self {
        Self {
            probe,
            dexs,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(settings.cache_ttl_secs))
                .max_capacity(settings.cache_max_entries)
                .build(),
            semaphore: Arc::new(Semaphore::new(settings.max_concurrency)),
            ladder: settings.ladder(),
        }
    }

    /// Verifies a single path. `Ok(None)` is the ordinary "no liquidity here"
    /// outcome; `Err` is reserved for malformed input and transport trouble
    /// on the full-amount call.
    #[instrument(skip(self), fields(chain_id, dex_id, amount_in = %amount_in, path = %format_path(path)))]
    pub async fn verify(
        &self,
        path: &[Address],
        chain_id: u64,
        dex_id: &str,
        amount_in: U256,
    ) -> Result<Option<VerifiedRoute>, VerifierError> {
        if path.len() < 2 {
            return Err(VerifierError::InvalidPath(format!(
                "path needs at least two tokens, got {}",
                path.len()
            )));
        }
        if has_adjacent_duplicates(path) {
            return Err(VerifierError::InvalidPath(format!(
                "adjacent duplicate token in {}",
                format_path(path)
            )));
        }
        if amount_in.is_zero() {
            return Ok(None);
        }

        let key = VerifyKey {
            chain_id,
            dex_id: dex_id.to_string(),
            path: path.to_vec(),
            amount_in,
        };
        if let Some(cached) = self.cache.get(&key).await {
            metrics::VERIFY_CACHE_HITS.inc();
            return Ok(cached);
        }

        let chain_label = chain_id.to_string();
        metrics::VERIFICATIONS
            .with_label_values(&[&chain_label, "attempted"])
            .inc();

        let router = self.dexs.venue(chain_id, dex_id)?.router;

        let result = match self.probe_once(chain_id, router, amount_in, path).await {
            Ok(amounts) => match Self::accept(&amounts, path.len(), amount_in) {
                Acceptance::Valid => {
                    metrics::PROBE_DEPTH
                        .with_label_values(&[&chain_label])
                        .observe(0.0);
                    VerifiedRoute::new(
                        TokenPath::from_slice(path),
                        amounts,
                        dex_id.to_string(),
                        chain_id,
                    )
                }
                Acceptance::ZeroOutput => {
                    self.run_ladder(path, chain_id, router, dex_id, amount_in)
                        .await?
                }
                Acceptance::Malformed(reason) => {
                    debug!(reason, "Rejecting malformed getAmountsOut result");
                    None
                }
            },
            Err(ProbeFailure::InsufficientLiquidity(message)) => {
                debug!(error = %message, "Full-amount probe hit liquidity limit, descending ladder");
                self.run_ladder(path, chain_id, router, dex_id, amount_in)
                    .await?
            }
            Err(ProbeFailure::Transport(e)) => {
                metrics::VERIFICATIONS
                    .with_label_values(&[&chain_label, "provider_error"])
                    .inc();
                return Err(VerifierError::Provider {
                    chain_id,
                    message: e.to_string(),
                });
            }
        };

        let outcome = if result.is_some() { "verified" } else { "no_liquidity" };
        metrics::VERIFICATIONS
            .with_label_values(&[&chain_label, outcome])
            .inc();
        self.cache.insert(key, result.clone()).await;
        Ok(result)
    }

    /// Runs `verify` over all candidates under the shared limiter and returns
    /// the one with strictly maximal output. Individual failures, transport
    /// included, are logged and discarded; they never abort siblings.
    pub async fn verify_many(
        &self,
        candidates: &[VerifyCandidate],
    ) -> Result<Option<VerifiedRoute>, VerifierError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let results = join_all(candidates.iter().map(|c| async {
            self.verify(&c.path, c.chain_id, &c.dex_id, c.amount_in).await
        }))
        .await;

        let mut best: Option<VerifiedRoute> = None;
        for (candidate, result) in candidates.iter().zip(results) {
            match result {
                Ok(Some(route)) => {
                    let better = best
                        .as_ref()
                        .map(|b| route.output_amount > b.output_amount)
                        .unwrap_or(true);
                    if better {
                        best = Some(route);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        chain_id = candidate.chain_id,
                        dex_id = %candidate.dex_id,
                        path = %format_path(&candidate.path),
                        amount_in = %candidate.amount_in,
                        error = %e,
                        "Candidate verification failed, continuing with siblings"
                    );
                }
            }
        }
        Ok(best)
    }

    /// Probes the descending test-amount ladder concurrently and scales the
    /// first (largest) success back up with the discount curve.
    async fn run_ladder(
        &self,
        path: &[Address],
        chain_id: u64,
        router: Address,
        dex_id: &str,
        amount_in: U256,
    ) -> Result<Option<VerifiedRoute>, VerifierError> {
        let test_amounts = self.ladder.test_amounts(amount_in);
        if test_amounts.is_empty() {
            return Ok(None);
        }

        let probes = join_all(test_amounts.iter().map(|test| async {
            self.probe_once(chain_id, router, *test, path).await
        }))
        .await;

        for (depth, (test_amount, outcome)) in test_amounts.iter().zip(probes).enumerate() {
            let amounts = match outcome {
                Ok(a) => a,
                Err(ProbeFailure::InsufficientLiquidity(_)) => continue,
                Err(ProbeFailure::Transport(e)) => {
                    debug!(
                        chain_id,
                        test_amount = %test_amount,
                        error = %e,
                        "Ladder probe transport failure, skipping rung"
                    );
                    continue;
                }
            };
            if !matches!(
                Self::accept(&amounts, path.len(), *test_amount),
                Acceptance::Valid
            ) {
                continue;
            }
            metrics::PROBE_DEPTH
                .with_label_values(&[&chain_id.to_string()])
                .observe((depth + 1) as f64);

            // Scale every hop so per-step amounts stay consistent with the
            // estimated output.
            let mut scaled = Vec::with_capacity(amounts.len());
            scaled.push(amount_in);
            for observed in &amounts[1..] {
                scaled.push(scale_probe_output(amount_in, *test_amount, *observed)?);
            }
            debug!(
                chain_id,
                dex_id,
                test_amount = %test_amount,
                estimated_out = %scaled.last().copied().unwrap_or_default(),
                "Scaled ladder probe to full amount"
            );
            return Ok(VerifiedRoute::new(
                TokenPath::from_slice(path),
                scaled,
                dex_id.to_string(),
                chain_id,
            ));
        }
        Ok(None)
    }

    async fn probe_once(
        &self,
        chain_id: u64,
        router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, ProbeFailure> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProbeFailure::Transport(RpcError::Provider("verifier shutting down".into())))?;
        metrics::INFLIGHT_PROBES.inc();
        let result = self.probe.amounts_out(chain_id, router, amount_in, path).await;
        metrics::INFLIGHT_PROBES.dec();
        result
    }

    fn accept(amounts: &[U256], path_len: usize, amount_in: U256) -> Acceptance {
        if amounts.len() != path_len {
            return Acceptance::Malformed("amounts length differs from path length");
        }
        if amounts[0] != amount_in {
            return Acceptance::Malformed("first amount differs from requested input");
        }
        if amounts.last().map(|a| a.is_zero()).unwrap_or(true) {
            return Acceptance::ZeroOutput;
        }
        Acceptance::Valid
    }
}

enum Acceptance {
    Valid,
    ZeroOutput,
    Malformed(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_liquidity_reverts() {
        assert!(is_liquidity_error("execution reverted: Pancake: K"));
        assert!(is_liquidity_error("INSUFFICIENT_LIQUIDITY"));
        assert!(!is_liquidity_error("connection refused"));
    }

    #[test]
    fn calldata_starts_with_selector() {
        let path = [Address::from_low_u64_be(1), Address::from_low_u64_be(2)];
        let data = RpcAmountsOutProbe::encode_call(U256::from(1_000u64), &path);
        assert_eq!(&data[..4], &GET_AMOUNTS_OUT_SELECTOR[..]);
        // selector + uint256 + array offset + array length + two addresses
        assert_eq!(data.len(), 4 + 32 * 5);
    }

    #[test]
    fn decodes_amounts_array() {
        let encoded = abi::encode(&[Token::Array(vec![
            Token::Uint(U256::from(10u64)),
            Token::Uint(U256::from(7u64)),
        ])]);
        let amounts = RpcAmountsOutProbe::decode_amounts(&encoded).unwrap();
        assert_eq!(amounts, vec![U256::from(10u64), U256::from(7u64)]);
    }

    #[test]
    fn acceptance_checks_shape_and_input_echo() {
        let amounts = vec![U256::from(5u64), U256::from(3u64)];
        assert!(matches!(
            QuoteVerifier::accept(&amounts, 2, U256::from(5u64)),
            Acceptance::Valid
        ));
        assert!(matches!(
            QuoteVerifier::accept(&amounts, 3, U256::from(5u64)),
            Acceptance::Malformed(_)
        ));
        assert!(matches!(
            QuoteVerifier::accept(&amounts, 2, U256::from(6u64)),
            Acceptance::Malformed(_)
        ));
        let zero = vec![U256::from(5u64), U256::zero()];
        assert!(matches!(
            QuoteVerifier::accept(&zero, 2, U256::from(5u64)),
            Acceptance::ZeroOutput
        ));
    }
}
