//! # Injected Registries
//!
//! Read-only routing data lifted out of `Config` at startup: per-chain venue
//! tables, token lists with their priority ordering, and the cross-chain
//! token-identity map. These are plain service objects handed to the finders
//! so tests can swap in small fixtures; discovery logic never reaches for
//! globals or re-reads configuration.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;

use crate::config::Config;
use crate::errors::RegistryError;

//================================================================================================//
//                                        DEX REGISTRY                                            //
//================================================================================================//

/// A venue answering `getAmountsOut` on `router`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexVenue {
    pub id: String,
    pub router: Address,
    pub priority: u32,
}

/// Per-chain venue table, priority-sorted at construction.
#[derive(Debug, Default)]
pub struct DexRegistry {
    by_chain: HashMap<u64, Vec<DexVenue>>,
}

impl DexRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut by_chain = HashMap::new();
        for chain in config.chains.values() {
            let venues = chain
                .dexs_by_priority()
                .into_iter()
                .map(|d| DexVenue {
                    id: d.id,
                    router: d.router,
                    priority: d.priority,
                })
                .collect();
            by_chain.insert(chain.chain_id, venues);
        }
        Self { by_chain }
    }

    /// All venues on a chain, lowest priority value first.
    pub fn venues(&self, chain_id: u64) -> Result<&[DexVenue], RegistryError> {
        let venues = self
            .by_chain
            .get(&chain_id)
            .ok_or(RegistryError::UnknownChain(chain_id))?;
        if venues.is_empty() {
            return Err(RegistryError::NoVenues(chain_id));
        }
        Ok(venues)
    }

    pub fn venue(&self, chain_id: u64, dex_id: &str) -> Result<&DexVenue, RegistryError> {
        self.venues(chain_id)?
            .iter()
            .find(|v| v.id == dex_id)
            .ok_or_else(|| RegistryError::UnknownVenue {
                chain_id,
                dex_id: dex_id.to_string(),
            })
    }

    /// Highest-priority venue, the one the intermediary scan probes against.
    pub fn top_venue(&self, chain_id: u64) -> Result<&DexVenue, RegistryError> {
        Ok(&self.venues(chain_id)?[0])
    }
}

//================================================================================================//
//                                       TOKEN REGISTRY                                           //
//================================================================================================//

#[derive(Debug, Clone)]
struct ChainTokens {
    chain_name: String,
    wrapped_native: Address,
    intermediaries: Vec<Address>,
    multihop_tokens: Vec<Address>,
    stablecoins: Vec<Address>,
    bridgeable: Vec<Address>,
    decimals: HashMap<Address, u8>,
    symbols: HashMap<Address, String>,
    avg_block_time_secs: f64,
}

/// Per-chain token lists and metadata.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    chains: HashMap<u64, ChainTokens>,
}

impl TokenRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut chains = HashMap::new();
        for chain in config.chains.values() {
            chains.insert(
                chain.chain_id,
                ChainTokens {
                    chain_name: chain.chain_name.clone(),
                    wrapped_native: chain.wrapped_native,
                    intermediaries: chain.intermediaries.clone(),
                    multihop_tokens: chain.multihop_tokens.clone(),
                    stablecoins: chain.reference_stablecoins.clone(),
                    bridgeable: chain.bridgeable_tokens(),
                    decimals: chain.token_decimals.clone(),
                    symbols: chain.token_symbols.clone(),
                    avg_block_time_secs: chain.avg_block_time_seconds.unwrap_or(12.0),
                },
            );
        }
        Self { chains }
    }

    fn chain(&self, chain_id: u64) -> Result<&ChainTokens, RegistryError> {
        self.chains
            .get(&chain_id)
            .ok_or(RegistryError::UnknownChain(chain_id))
    }

    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn chain_name(&self, chain_id: u64) -> Option<&str> {
        self.chains.get(&chain_id).map(|c| c.chain_name.as_str())
    }

    pub fn wrapped_native(&self, chain_id: u64) -> Result<Address, RegistryError> {
        Ok(self.chain(chain_id)?.wrapped_native)
    }

    /// 2-hop scan intermediaries, priority order.
    pub fn intermediaries(&self, chain_id: u64) -> Result<&[Address], RegistryError> {
        Ok(&self.chain(chain_id)?.intermediaries)
    }

    /// Multi-hop fan-out intermediaries, priority order.
    pub fn multihop_tokens(&self, chain_id: u64) -> Result<&[Address], RegistryError> {
        Ok(&self.chain(chain_id)?.multihop_tokens)
    }

    pub fn stablecoins(&self, chain_id: u64) -> Result<&[Address], RegistryError> {
        Ok(&self.chain(chain_id)?.stablecoins)
    }

    /// Bridgeable tokens, wrapped native first unless overridden.
    pub fn bridgeable_tokens(&self, chain_id: u64) -> Result<&[Address], RegistryError> {
        Ok(&self.chain(chain_id)?.bridgeable)
    }

    pub fn decimals_hint(&self, chain_id: u64, token: Address) -> Option<u8> {
        self.chains
            .get(&chain_id)
            .and_then(|c| c.decimals.get(&token).copied())
    }

    pub fn symbol(&self, chain_id: u64, token: Address) -> Option<&str> {
        self.chains
            .get(&chain_id)
            .and_then(|c| c.symbols.get(&token))
            .map(|s| s.as_str())
    }

    pub fn avg_block_time_secs(&self, chain_id: u64) -> f64 {
        self.chains
            .get(&chain_id)
            .map(|c| c.avg_block_time_secs)
            .unwrap_or(12.0)
    }
}

//================================================================================================//
//                                   CROSS-CHAIN TOKEN MAP                                        //
//================================================================================================//

/// Static token-identity map across chains. Resolution layers, first hit
/// wins: curated equivalences, wrapped-native to wrapped-native, stablecoin
/// to stablecoin by shared symbol.
pub struct CrossChainTokenMap {
    curated: HashMap<(u64, Address, u64), Address>,
    tokens: Arc<TokenRegistry>,
}

impl CrossChainTokenMap {
    pub fn from_config(config: &Config, tokens: Arc<TokenRegistry>) -> Self {
        let mut curated = HashMap::new();
        for entry in &config.cross_chain_map {
            curated.insert(
                (entry.from_chain_id, entry.from_token, entry.to_chain_id),
                entry.to_token,
            );
            // Equivalence is symmetric; store the reverse edge too.
            curated.insert(
                (entry.to_chain_id, entry.to_token, entry.from_chain_id),
                entry.from_token,
            );
        }
        Self { curated, tokens }
    }

    /// Resolves the destination-chain identity of `token`, or `None` when no
    /// mapping exists. `None` fails the bridge candidate, it is not an error.
    pub fn resolve(&self, from_chain_id: u64, token: Address, to_chain_id: u64) -> Option<Address> {
        if let Some(mapped) = self.curated.get(&(from_chain_id, token, to_chain_id)) {
            return Some(*mapped);
        }
        if let (Ok(from_native), Ok(to_native)) = (
            self.tokens.wrapped_native(from_chain_id),
            self.tokens.wrapped_native(to_chain_id),
        ) {
            if token == from_native {
                return Some(to_native);
            }
        }
        let symbol = self.tokens.symbol(from_chain_id, token)?;
        let is_source_stable = self
            .tokens
            .stablecoins(from_chain_id)
            .map(|s| s.contains(&token))
            .unwrap_or(false);
        if !is_source_stable {
            return None;
        }
        self.tokens
            .stablecoins(to_chain_id)
            .ok()?
            .iter()
            .copied()
            .find(|candidate| self.tokens.symbol(to_chain_id, *candidate) == Some(symbol))
    }
}
