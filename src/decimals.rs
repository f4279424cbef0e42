//! # Token Decimals Resolution
//!
//! Decimals feed every human-amount conversion, so lookups cascade from
//! cheap to expensive: process cache, per-chain registry hints, a table of
//! universally known tokens, and finally an on-chain `decimals()` call
//! through the provider cache and the chain's rate limiter. Results are
//! cached for the life of the process; decimals never change for a token.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionRequest};
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::errors::{RegistryError, RpcError};
use crate::providers::ProviderFactory;
use crate::rate_limiter::RateLimiterRegistry;
use crate::registry::TokenRegistry;

static DECIMALS_SELECTOR: Lazy<Bytes> =
    Lazy::new(|| Bytes::from(ethers::utils::id("decimals()").to_vec()));

/// Universally known token decimals, keyed by address. Seeds the cache so
/// the hot tokens never cost an RPC round trip.
static KNOWN_TOKEN_DECIMALS: Lazy<HashMap<Address, u8>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let mut insert = |addr: &str, decimals: u8| {
        m.insert(Address::from_str(addr).unwrap(), decimals);
    };
    insert("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", 18); // WETH (Ethereum)
    insert("0x82af49447d8a07e3bd95bd0d56f35241523fbab1", 18); // WETH (Arbitrum)
    insert("0x4200000000000000000000000000000000000006", 18); // WETH (Base, Optimism)
    insert("0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c", 18); // WBNB (BSC)
    insert("0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270", 18); // WMATIC (Polygon)
    insert("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6); // USDC (Ethereum)
    insert("0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", 18); // USDC (BSC, 18 decimals)
    insert("0xdac17f958d2ee523a2206206994597c13d831ec7", 6); // USDT (Ethereum)
    insert("0x55d398326f99059ff775485246999027b3197955", 18); // USDT (BSC)
    insert("0x6b175474e89094c44da98b954eedeac495271d0f", 18); // DAI (Ethereum)
    insert("0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", 8); // WBTC (Ethereum)
    m
});

pub struct DecimalsCache {
    cache: DashMap<(u64, Address), u8>,
    tokens: Arc<TokenRegistry>,
    providers: Arc<ProviderFactory>,
    limiters: Arc<RateLimiterRegistry>,
}

impl DecimalsCache {
    pub fn new(
        tokens: Arc<TokenRegistry>,
        providers: Arc<ProviderFactory>,
        limiters: Arc<RateLimiterRegistry>,
    ) -> Self {
        Self {
            cache: DashMap::new(),
            tokens,
            providers,
            limiters,
        }
    }

    pub async fn decimals(&self, chain_id: u64, token: Address) -> Result<u8, RegistryError> {
        if let Some(hit) = self.cache.get(&(chain_id, token)) {
            return Ok(*hit);
        }
        if let Some(hint) = self.tokens.decimals_hint(chain_id, token) {
            self.cache.insert((chain_id, token), hint);
            return Ok(hint);
        }
        if let Some(known) = KNOWN_TOKEN_DECIMALS.get(&token) {
            self.cache.insert((chain_id, token), *known);
            return Ok(*known);
        }
        let fetched = self.fetch_on_chain(chain_id, token).await.map_err(|e| {
            RegistryError::DecimalsUnavailable {
                chain_id,
                token,
                message: e.to_string(),
            }
        })?;
        debug!(chain_id, token = ?token, decimals = fetched, "Fetched token decimals on-chain");
        self.cache.insert((chain_id, token), fetched);
        Ok(fetched)
    }

    async fn fetch_on_chain(&self, chain_id: u64, token: Address) -> Result<u8, RpcError> {
        let provider = self.providers.get(chain_id)?;
        let chain_name = self
            .tokens
            .chain_name(chain_id)
            .unwrap_or("unknown")
            .to_string();
        let limiter = self.limiters.get_or_create(chain_id, &chain_name, None, None);

        let raw = limiter
            .execute_rpc_call("decimals", || {
                let provider = provider.clone();
                let tx = TransactionRequest::new()
                    .to(token)
                    .data(DECIMALS_SELECTOR.clone());
                async move {
                    provider
                        .call(&tx.into(), None)
                        .await
                        .map_err(|e| RpcError::Provider(e.to_string()))
                }
            })
            .await?;

        if raw.len() != 32 {
            warn!(chain_id, token = ?token, len = raw.len(), "Unexpected decimals() response length");
            return Err(RpcError::Provider(format!(
                "invalid decimals response length: expected 32 bytes, got {}",
                raw.len()
            )));
        }
        // uint8 lives in the least significant byte of the word.
        Ok(raw[31])
    }
}
