//! # Centralized Provider Management
//!
//! One `Provider<Http>` per configured chain, constructed on first use and
//! reused for the life of the process. Client construction dominates cost at
//! discovery call volume, so nothing below this layer builds providers.

use std::sync::Arc;

use dashmap::DashMap;
use ethers::providers::{Http, Provider};
use tracing::debug;

use crate::config::Config;
use crate::errors::RpcError;

pub struct ProviderFactory {
    providers: DashMap<u64, Arc<Provider<Http>>>,
    rpc_urls: DashMap<u64, String>,
}

impl ProviderFactory {
    pub fn from_config(config: &Config) -> Self {
        let rpc_urls = DashMap::new();
        for chain in config.chains.values() {
            rpc_urls.insert(chain.chain_id, chain.rpc_url.clone());
        }
        Self {
            providers: DashMap::new(),
            rpc_urls,
        }
    }

    /// Cached provider for `chain_id`. Fails for unconfigured chains or
    /// malformed RPC URLs; both are configuration problems, not liquidity
    /// outcomes.
    pub fn get(&self, chain_id: u64) -> Result<Arc<Provider<Http>>, RpcError> {
        if let Some(provider) = self.providers.get(&chain_id) {
            return Ok(provider.clone());
        }
        let url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or_else(|| RpcError::Provider(format!("no RPC URL configured for chain {chain_id}")))?
            .clone();
        let provider = Arc::new(
            Provider::<Http>::try_from(url.as_str())
                .map_err(|e| RpcError::Provider(format!("invalid RPC URL for chain {chain_id}: {e}")))?,
        );
        debug!(chain_id, url = %url, "Constructed RPC provider");
        self.providers.insert(chain_id, provider.clone());
        Ok(provider)
    }

    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.rpc_urls.contains_key(&chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DexConfig, PerChainConfig};
    use ethers::types::Address;
    use std::collections::HashMap;

    fn config_with_chain(chain_id: u64, rpc_url: &str) -> Config {
        let chain = PerChainConfig {
            chain_id,
            chain_name: "test".into(),
            rpc_url: rpc_url.into(),
            wrapped_native: Address::from_low_u64_be(1),
            dexs: vec![DexConfig {
                id: "testswap".into(),
                router: Address::from_low_u64_be(2),
                priority: 0,
            }],
            intermediaries: Vec::new(),
            multihop_tokens: Vec::new(),
            reference_stablecoins: Vec::new(),
            bridgeable_tokens: None,
            token_decimals: HashMap::new(),
            token_symbols: HashMap::new(),
            rps_limit: None,
            max_concurrent_requests: None,
            avg_block_time_seconds: None,
        };
        let mut chains = HashMap::new();
        chains.insert("test".to_string(), chain);
        Config {
            log_level: "info".into(),
            chains,
            verifier: Default::default(),
            routing: Default::default(),
            rate_limiter: Default::default(),
            server: Default::default(),
            aggregators: Vec::new(),
            bridge_providers: Vec::new(),
            cross_chain_map: Vec::new(),
        }
    }

    #[test]
    fn caches_constructed_providers() {
        let factory = ProviderFactory::from_config(&config_with_chain(56, "http://localhost:8545"));
        let a = factory.get(56).unwrap();
        let b = factory.get(56).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let factory = ProviderFactory::from_config(&config_with_chain(56, "http://localhost:8545"));
        assert!(factory.get(1).is_err());
        assert!(!factory.supports_chain(1));
        assert!(factory.supports_chain(56));
    }
}
