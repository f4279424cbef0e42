//! # Modular Configuration System
//!
//! Settings load from a directory of specialized JSON files: `main.json`
//! (engine, verifier, server, venue and bridge endpoints) and `chains.json`
//! (per-chain registries). The resulting `Config` is the single source of
//! truth the service objects are built from; discovery code never reads
//! files or environment variables itself.

use std::collections::HashMap;
use std::path::Path;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::scaling::ProbeLadder;

//================================================================================================//
//                                       Top-Level Config                                         //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub chains: HashMap<String, PerChainConfig>,
    #[serde(default)]
    pub verifier: VerifierSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub rate_limiter: RateLimiterSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub aggregators: Vec<AggregatorVenueConfig>,
    #[serde(default)]
    pub bridge_providers: Vec<BridgeProviderConfig>,
    /// Curated cross-chain token equivalences, layered over the
    /// wrapped-native and stablecoin-symbol rules.
    #[serde(default)]
    pub cross_chain_map: Vec<CrossChainMapEntry>,
}

/// Shape of `main.json`; `chains.json` supplies the `chains` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MainConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    verifier: VerifierSettings,
    #[serde(default)]
    routing: RoutingSettings,
    #[serde(default)]
    rate_limiter: RateLimiterSettings,
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    aggregators: Vec<AggregatorVenueConfig>,
    #[serde(default)]
    bridge_providers: Vec<BridgeProviderConfig>,
    #[serde(default)]
    cross_chain_map: Vec<CrossChainMapEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainFile {
    chains: HashMap<String, PerChainConfig>,
}

impl Config {
    pub async fn load_from_directory<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let main: MainConfig = Self::load_file(dir.join("main.json")).await?;
        let chain_file: ChainFile = Self::load_file(dir.join("chains.json")).await?;
        let config = Self {
            log_level: main.log_level,
            chains: chain_file.chains,
            verifier: main.verifier,
            routing: main.routing,
            rate_limiter: main.rate_limiter,
            server: main.server,
            aggregators: main.aggregators,
            bridge_providers: main.bridge_providers,
            cross_chain_map: main.cross_chain_map,
        };
        config.validate()?;
        Ok(config)
    }

    async fn load_file<T: for<'de> Deserialize<'de>>(
        path: impl AsRef<Path>,
    ) -> Result<T, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&PerChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.values().map(|c| c.chain_id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::Validation("no chains configured".into()));
        }
        let mut seen_ids = Vec::new();
        for chain in self.chains.values() {
            chain.validate()?;
            if seen_ids.contains(&chain.chain_id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate chain_id {}",
                    chain.chain_id
                )));
            }
            seen_ids.push(chain.chain_id);
        }
        if !self.verifier.ladder().is_descending() {
            return Err(ConfigError::Validation(
                "verifier.probe_fractions_bps must be strictly descending".into(),
            ));
        }
        if self.verifier.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "verifier.max_concurrency must be positive".into(),
            ));
        }
        for entry in &self.cross_chain_map {
            if entry.from_chain_id == entry.to_chain_id {
                return Err(ConfigError::Validation(format!(
                    "cross_chain_map entry maps chain {} to itself",
                    entry.from_chain_id
                )));
            }
        }
        Ok(())
    }
}

//================================================================================================//
//                                       Per-Chain Config                                         //
//================================================================================================//

/// One DEX-style venue reachable over `getAmountsOut` on `router`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DexConfig {
    pub id: String,
    pub router: Address,
    /// Lower priority values are tried first.
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerChainConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub wrapped_native: Address,
    pub dexs: Vec<DexConfig>,
    /// Top-priority intermediaries for the 2-hop verification scan.
    #[serde(default)]
    pub intermediaries: Vec<Address>,
    /// Intermediary list for the multi-hop adapter fan-out; distinct from
    /// `intermediaries` on purpose.
    #[serde(default)]
    pub multihop_tokens: Vec<Address>,
    #[serde(default)]
    pub reference_stablecoins: Vec<Address>,
    /// Priority-ordered bridgeable tokens. Defaults to wrapped native
    /// followed by the reference stablecoins.
    pub bridgeable_tokens: Option<Vec<Address>>,
    #[serde(default)]
    pub token_decimals: HashMap<Address, u8>,
    #[serde(default)]
    pub token_symbols: HashMap<Address, String>,
    pub rps_limit: Option<u32>,
    pub max_concurrent_requests: Option<u32>,
    pub avg_block_time_seconds: Option<f64>,
}

impl PerChainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "RPC URL is missing for chain {}",
                self.chain_name
            )));
        }
        if self.chain_id == 0 {
            return Err(ConfigError::Validation(format!(
                "chain_id is zero for chain {}",
                self.chain_name
            )));
        }
        if self.wrapped_native == Address::zero() {
            return Err(ConfigError::Validation(format!(
                "wrapped_native is unset for chain {}",
                self.chain_name
            )));
        }
        let mut priorities: Vec<u32> = self.dexs.iter().map(|d| d.priority).collect();
        priorities.sort_unstable();
        priorities.dedup();
        if priorities.len() != self.dexs.len() {
            return Err(ConfigError::Validation(format!(
                "duplicate dex priorities on chain {}",
                self.chain_name
            )));
        }
        for (token, decimals) in &self.token_decimals {
            if *decimals > 36 {
                return Err(ConfigError::Validation(format!(
                    "implausible decimals {decimals} for token {token:?} on chain {}",
                    self.chain_name
                )));
            }
        }
        Ok(())
    }

    /// Bridgeable tokens in priority order: configured list, or wrapped
    /// native first then the reference stablecoins.
    pub fn bridgeable_tokens(&self) -> Vec<Address> {
        if let Some(list) = &self.bridgeable_tokens {
            return list.clone();
        }
        let mut tokens = vec![self.wrapped_native];
        for stable in &self.reference_stablecoins {
            if !tokens.contains(stable) {
                tokens.push(*stable);
            }
        }
        tokens
    }

    /// Venues sorted by priority, lowest first.
    pub fn dexs_by_priority(&self) -> Vec<DexConfig> {
        let mut dexs = self.dexs.clone();
        dexs.sort_by_key(|d| d.priority);
        dexs
    }
}

//================================================================================================//
//                                       Module Settings                                          //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,
    /// Shared bound on simultaneous outbound verification calls.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_probe_fractions")]
    pub probe_fractions_bps: Vec<u32>,
    #[serde(default = "default_probe_floor")]
    pub probe_floor: U256,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            max_concurrency: default_max_concurrency(),
            probe_fractions_bps: default_probe_fractions(),
            probe_floor: default_probe_floor(),
        }
    }
}

impl VerifierSettings {
    pub fn ladder(&self) -> ProbeLadder {
        ProbeLadder {
            fractions_bps: self.probe_fractions_bps.clone(),
            floor: self.probe_floor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Top-K intermediaries considered in the 2-hop scan.
    #[serde(default = "default_top_intermediaries")]
    pub top_intermediaries: usize,
    #[serde(default = "default_same_chain_ttl_secs")]
    pub same_chain_ttl_secs: u64,
    #[serde(default = "default_cross_chain_ttl_secs")]
    pub cross_chain_ttl_secs: u64,
    /// Wall-clock budget for one discovery call.
    #[serde(default = "default_overall_deadline_ms")]
    pub overall_deadline_ms: u64,
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            top_intermediaries: default_top_intermediaries(),
            same_chain_ttl_secs: default_same_chain_ttl_secs(),
            cross_chain_ttl_secs: default_cross_chain_ttl_secs(),
            overall_deadline_ms: default_overall_deadline_ms(),
            max_alternatives: default_max_alternatives(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterSettings {
    #[serde(default = "default_chain_rps")]
    pub default_chain_rps: u32,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Deadline applied to every individual RPC call.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            default_chain_rps: default_chain_rps(),
            burst_size: default_burst_size(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// An HTTP aggregator venue exposed through the adapter registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorVenueConfig {
    pub name: String,
    pub base_url: String,
    pub priority: u32,
    pub chains: Vec<u64>,
    #[serde(default)]
    pub supports_cross_chain: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeProviderConfig {
    pub name: String,
    pub base_url: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossChainMapEntry {
    pub from_chain_id: u64,
    pub from_token: Address,
    pub to_chain_id: u64,
    pub to_token: Address,
}

//================================================================================================//
//                                          Defaults                                              //
//================================================================================================//

fn default_log_level() -> String {
    "info".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    30
}
fn default_cache_max_entries() -> u64 {
    10_000
}
fn default_max_concurrency() -> usize {
    8
}
fn default_probe_fractions() -> Vec<u32> {
    vec![5_000, 1_000, 100]
}
fn default_probe_floor() -> U256 {
    U256::exp10(15)
}
fn default_top_intermediaries() -> usize {
    5
}
fn default_same_chain_ttl_secs() -> u64 {
    30
}
fn default_cross_chain_ttl_secs() -> u64 {
    120
}
fn default_overall_deadline_ms() -> u64 {
    8_000
}
fn default_max_alternatives() -> usize {
    3
}
fn default_chain_rps() -> u32 {
    10
}
fn default_burst_size() -> u32 {
    5
}
fn default_rpc_timeout_ms() -> u64 {
    3_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_max_ms() -> u64 {
    4_000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9090
}
