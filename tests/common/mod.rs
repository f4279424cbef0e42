//! Shared fixtures: a two-chain configuration, a scriptable pricing probe,
//! a scriptable bridge provider, and a fully wired service harness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use tokio_util::sync::CancellationToken;

use routescout::adapters::{AdapterRegistry, DexRouterAdapter, VenueAdapter};
use routescout::bridges::{BridgeQuote, BridgeQuoteProvider, BridgeQuoteRequest};
use routescout::config::{Config, DexConfig, PerChainConfig};
use routescout::cross::CrossChainFinder;
use routescout::decimals::DecimalsCache;
use routescout::engine::RouteEngine;
use routescout::errors::{BridgeError, RpcError};
use routescout::normalizer::RouteNormalizer;
use routescout::path::{MultiHopRouter, SameChainFinder};
use routescout::providers::ProviderFactory;
use routescout::rate_limiter::RateLimiterRegistry;
use routescout::registry::{CrossChainTokenMap, DexRegistry, TokenRegistry};
use routescout::types::RawPayload;
use routescout::verifier::{AmountsOutProbe, ProbeFailure, QuoteVerifier};

pub fn addr(v: u64) -> Address {
    Address::from_low_u64_be(v)
}

// BSC fixture tokens.
pub fn wbnb() -> Address {
    addr(0x11)
}
pub fn usdt_bsc() -> Address {
    addr(0x12)
}
pub fn busd() -> Address {
    addr(0x13)
}
pub fn tok_a() -> Address {
    addr(0x21)
}
pub fn tok_b() -> Address {
    addr(0x22)
}

// Ethereum fixture tokens.
pub fn weth() -> Address {
    addr(0x31)
}
pub fn usdt_eth() -> Address {
    addr(0x32)
}
pub fn tok_c() -> Address {
    addr(0x33)
}

pub fn one_ether() -> U256 {
    U256::exp10(18)
}

/// Two chains, two venues on BSC, one on Ethereum. Every fixture token
/// carries a decimals hint so nothing reaches for an RPC provider.
pub fn test_config() -> Config {
    let mut bsc_decimals = HashMap::new();
    let mut bsc_symbols = HashMap::new();
    for (token, symbol) in [
        (wbnb(), "WBNB"),
        (usdt_bsc(), "USDT"),
        (busd(), "BUSD"),
        (tok_a(), "TKA"),
        (tok_b(), "TKB"),
    ] {
        bsc_decimals.insert(token, 18u8);
        bsc_symbols.insert(token, symbol.to_string());
    }
    let mut eth_decimals = HashMap::new();
    let mut eth_symbols = HashMap::new();
    for (token, symbol) in [(weth(), "WETH"), (usdt_eth(), "USDT"), (tok_c(), "TKC")] {
        eth_decimals.insert(token, 18u8);
        eth_symbols.insert(token, symbol.to_string());
    }

    let bsc = PerChainConfig {
        chain_id: 56,
        chain_name: "bsc".into(),
        rpc_url: "http://localhost:8545".into(),
        wrapped_native: wbnb(),
        dexs: vec![
            DexConfig {
                id: "pancakeswap".into(),
                router: addr(0x101),
                priority: 0,
            },
            DexConfig {
                id: "biswap".into(),
                router: addr(0x102),
                priority: 1,
            },
        ],
        intermediaries: vec![wbnb(), usdt_bsc(), busd()],
        multihop_tokens: vec![wbnb(), usdt_bsc()],
        reference_stablecoins: vec![usdt_bsc(), busd()],
        bridgeable_tokens: None,
        token_decimals: bsc_decimals,
        token_symbols: bsc_symbols,
        rps_limit: Some(100),
        max_concurrent_requests: Some(16),
        avg_block_time_seconds: Some(3.0),
    };
    let ethereum = PerChainConfig {
        chain_id: 1,
        chain_name: "ethereum".into(),
        rpc_url: "http://localhost:8546".into(),
        wrapped_native: weth(),
        dexs: vec![DexConfig {
            id: "uniswap_v2".into(),
            router: addr(0x103),
            priority: 0,
        }],
        intermediaries: vec![weth(), usdt_eth()],
        multihop_tokens: vec![weth()],
        reference_stablecoins: vec![usdt_eth()],
        bridgeable_tokens: None,
        token_decimals: eth_decimals,
        token_symbols: eth_symbols,
        rps_limit: Some(100),
        max_concurrent_requests: Some(16),
        avg_block_time_seconds: Some(12.0),
    };

    let mut chains = HashMap::new();
    chains.insert("bsc".to_string(), bsc);
    chains.insert("ethereum".to_string(), ethereum);
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

/// Scripted behavior for one `(chain, path)` pair.
#[derive(Debug, Clone, Copy)]
pub enum ProbeScript {
    /// Every hop multiplies the running amount by `num / den`.
    Rate { num: u64, den: u64 },
    /// `Rate` behavior after `delay_ms` of sleep, so the probe pends like a
    /// real RPC call instead of resolving in a single poll.
    Slow { delay_ms: u64, num: u64, den: u64 },
    /// Liquidity revert above `max_in`; `Rate` behavior at or below it.
    Capped { max_in: U256, num: u64, den: u64 },
    /// Always reverts like a drained pool.
    Liquidity,
    /// Always fails like a dead provider.
    Transport,
}

/// In-memory `getAmountsOut` with per-path scripts and a call journal.
/// Unscripted paths behave like pools with no liquidity.
#[derive(Debug, Default)]
pub struct FakeAmountsOutProbe {
    scripts: Mutex<HashMap<(u64, Vec<Address>), ProbeScript>>,
    calls: Mutex<Vec<(u64, Vec<Address>, U256)>>,
}

impl FakeAmountsOutProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, chain_id: u64, path: &[Address], script: ProbeScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert((chain_id, path.to_vec()), script);
    }

    pub fn calls(&self) -> Vec<(u64, Vec<Address>, U256)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, chain_id: u64, path: &[Address]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, p, _)| *c == chain_id && p == path)
            .count()
    }

    fn apply_rate(amount_in: U256, hops: usize, num: u64, den: u64) -> Vec<U256> {
        let mut amounts = Vec::with_capacity(hops + 1);
        amounts.push(amount_in);
        let mut running = amount_in;
        for _ in 0..hops {
            running = running * U256::from(num) / U256::from(den.max(1));
            amounts.push(running);
        }
        amounts
    }
}

#[async_trait]
impl AmountsOutProbe for FakeAmountsOutProbe {
    async fn amounts_out(
        &self,
        chain_id: u64,
        _router: Address,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, ProbeFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((chain_id, path.to_vec(), amount_in));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&(chain_id, path.to_vec()))
            .copied()
            .unwrap_or(ProbeScript::Liquidity);
        match script {
            ProbeScript::Rate { num, den } => {
                Ok(Self::apply_rate(amount_in, path.len() - 1, num, den))
            }
            ProbeScript::Slow { delay_ms, num, den } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(Self::apply_rate(amount_in, path.len() - 1, num, den))
            }
            ProbeScript::Capped { max_in, num, den } => {
                if amount_in > max_in {
                    Err(ProbeFailure::InsufficientLiquidity(
                        "execution reverted: INSUFFICIENT_LIQUIDITY".into(),
                    ))
                } else {
                    Ok(Self::apply_rate(amount_in, path.len() - 1, num, den))
                }
            }
            ProbeScript::Liquidity => Err(ProbeFailure::InsufficientLiquidity(
                "execution reverted: INSUFFICIENT_LIQUIDITY".into(),
            )),
            ProbeScript::Transport => Err(ProbeFailure::Transport(RpcError::Provider(
                "connection refused".into(),
            ))),
        }
    }
}

/// Scripted bridge quote for one `(from_chain, to_chain, from_token)` lane.
#[derive(Debug, Clone, Copy)]
pub struct BridgeScript {
    /// Token delivered on the destination chain.
    pub to_token: Address,
    pub num: u64,
    pub den: u64,
    pub time_secs: u64,
}

#[derive(Debug, Default)]
pub struct FakeBridgeProvider {
    quotes: Mutex<HashMap<(u64, u64, Address), BridgeScript>>,
    calls: Mutex<Vec<BridgeQuoteRequest>>,
}

impl FakeBridgeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, from_chain: u64, to_chain: u64, from_token: Address, s: BridgeScript) {
        self.quotes
            .lock()
            .unwrap()
            .insert((from_chain, to_chain, from_token), s);
    }

    pub fn calls(&self) -> Vec<BridgeQuoteRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeQuoteProvider for FakeBridgeProvider {
    fn name(&self) -> &str {
        "fakebridge"
    }

    fn priority(&self) -> u32 {
        0
    }

    fn supports(&self, from_chain_id: u64, to_chain_id: u64) -> bool {
        from_chain_id != to_chain_id
    }

    async fn fetch_quote(
        &self,
        request: &BridgeQuoteRequest,
    ) -> Result<Option<BridgeQuote>, BridgeError> {
        self.calls.lock().unwrap().push(request.clone());
        let script = self
            .quotes
            .lock()
            .unwrap()
            .get(&(
                request.from_chain_id,
                request.to_chain_id,
                request.from_token,
            ))
            .copied();
        let Some(s) = script else {
            return Ok(None);
        };
        let amount_out = request.amount_in * U256::from(s.num) / U256::from(s.den.max(1));
        Ok(Some(BridgeQuote {
            provider: "fakebridge".into(),
            to_token: s.to_token,
            amount_out,
            estimated_time_secs: s.time_secs,
            quote: RawPayload {
                venue: "fakebridge".into(),
                payload: serde_json::json!({ "toAmount": amount_out.to_string() }),
            },
        }))
    }
}

/// Fully wired discovery stack over the fakes, mirroring the production
/// construction order.
pub struct Harness {
    pub probe: Arc<FakeAmountsOutProbe>,
    pub bridge: Arc<FakeBridgeProvider>,
    pub tokens: Arc<TokenRegistry>,
    pub dexs: Arc<DexRegistry>,
    pub verifier: Arc<QuoteVerifier>,
    pub normalizer: Arc<RouteNormalizer>,
    pub samechain: Arc<SameChainFinder>,
    pub cross: Arc<CrossChainFinder>,
    pub multihop: Arc<MultiHopRouter>,
    pub engine: Arc<RouteEngine>,
}

pub fn harness() -> Harness {
    harness_with_config(test_config())
}

pub fn harness_with_config(config: Config) -> Harness {
    let probe = FakeAmountsOutProbe::new();
    let bridge = FakeBridgeProvider::new();

    let providers = Arc::new(ProviderFactory::from_config(&config));
    let limiters = Arc::new(RateLimiterRegistry::new(config.rate_limiter.clone()));
    let tokens = Arc::new(TokenRegistry::from_config(&config));
    let dexs = Arc::new(DexRegistry::from_config(&config));
    let cross_map = Arc::new(CrossChainTokenMap::from_config(&config, tokens.clone()));
    let decimals = Arc::new(DecimalsCache::new(tokens.clone(), providers, limiters));

    let verifier = Arc::new(QuoteVerifier::new(
        probe.clone(),
        dexs.clone(),
        &config.verifier,
    ));
    let normalizer = Arc::new(RouteNormalizer::new(
        tokens.clone(),
        decimals.clone(),
        config.routing.clone(),
    ));

    let mut venue_chains: HashMap<String, (u32, Vec<u64>)> = HashMap::new();
    for chain in config.chains.values() {
        for dex in &chain.dexs {
            let entry = venue_chains
                .entry(dex.id.clone())
                .or_insert((dex.priority, Vec::new()));
            entry.0 = entry.0.min(dex.priority);
            entry.1.push(chain.chain_id);
        }
    }
    let adapters: Vec<Arc<dyn VenueAdapter>> = venue_chains
        .into_iter()
        .map(|(id, (priority, chains))| {
            Arc::new(DexRouterAdapter::new(
                id,
                priority,
                chains,
                verifier.clone(),
                normalizer.clone(),
            )) as Arc<dyn VenueAdapter>
        })
        .collect();
    let adapter_registry = Arc::new(AdapterRegistry::new(adapters));

    let samechain = Arc::new(SameChainFinder::new(
        verifier.clone(),
        dexs.clone(),
        tokens.clone(),
        config.routing.top_intermediaries,
    ));
    let cross = Arc::new(CrossChainFinder::new(
        samechain.clone(),
        tokens.clone(),
        cross_map,
        vec![bridge.clone() as Arc<dyn BridgeQuoteProvider>],
        config.verifier.max_concurrency,
    ));
    let multihop = Arc::new(MultiHopRouter::new(
        adapter_registry,
        tokens.clone(),
        normalizer.clone(),
        cross.clone(),
        config.verifier.max_concurrency,
    ));
    let engine = Arc::new(RouteEngine::new(
        samechain.clone(),
        multihop.clone(),
        cross.clone(),
        normalizer.clone(),
        tokens.clone(),
        decimals,
        config.routing.clone(),
        CancellationToken::new(),
    ));

    Harness {
        probe,
        bridge,
        tokens,
        dexs,
        verifier,
        normalizer,
        samechain,
        cross,
        multihop,
        engine,
    }
}
