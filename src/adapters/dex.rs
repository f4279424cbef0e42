//! On-chain DEX router venue: quotes a direct pair through the shared
//! verifier, which already carries the probe-and-scale fallback and the TTL
//! cache. One adapter per venue id; the verifier resolves the concrete
//! router address per chain from the injected registry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use smallvec::SmallVec;
use tracing::debug;

use crate::errors::AdapterError;
use crate::metrics;
use crate::normalizer::RouteNormalizer;
use crate::types::{RouterParams, RouterRoute, SameChainRoute, TokenPath};
use crate::verifier::QuoteVerifier;

use super::VenueAdapter;

pub struct DexRouterAdapter {
    id: String,
    priority: u32,
    chains: Vec<u64>,
    verifier: Arc<QuoteVerifier>,
    normalizer: Arc<RouteNormalizer>,
}

impl fmt::Debug for DexRouterAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DexRouterAdapter")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("chains", &self.chains)
            .finish()
    }
}

impl DexRouterAdapter {
    pub fn new(
        id: String,
        priority: u32,
        chains: Vec<u64>,
        verifier: Arc<QuoteVerifier>,
        normalizer: Arc<RouteNormalizer>,
    ) -> Self {
        Self {
            id,
            priority,
            chains,
            verifier,
            normalizer,
        }
    }
}

#[async_trait]
impl VenueAdapter for DexRouterAdapter {
    fn name(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn supports_chain(&self, chain_id: u64) -> bool {
        self.chains.contains(&chain_id)
    }

    fn supports_cross_chain(&self) -> bool {
        false
    }

    async fn get_route(&self, params: &RouterParams) -> Result<Option<RouterRoute>, AdapterError> {
        if params.is_cross_chain() {
            return Ok(None);
        }
        if !self.supports_chain(params.from_chain_id) {
            return Err(AdapterError::UnsupportedChain {
                venue: self.id.clone(),
                chain_id: params.from_chain_id,
            });
        }
        if params.from_token == params.to_token {
            return Err(AdapterError::UnsupportedPair {
                venue: self.id.clone(),
                from: params.from_token,
                to: params.to_token,
            });
        }

        let path: TokenPath = SmallVec::from_slice(&[params.from_token, params.to_token]);
        let verified = self
            .verifier
            .verify(&path, params.from_chain_id, &self.id, params.from_amount)
            .await?;
        let Some(verified) = verified else {
            metrics::ADAPTER_REQUESTS
                .with_label_values(&[&self.id, "no_route"])
                .inc();
            return Ok(None);
        };

        let route = SameChainRoute::from_verified(verified);
        let normalized = self
            .normalizer
            .same_chain(&route, params.from_amount, params.slippage)
            .await
            .map_err(|e| AdapterError::InvalidResponse {
                venue: self.id.clone(),
                message: e.to_string(),
            })?;
        debug!(
            venue = %self.id,
            chain_id = params.from_chain_id,
            out = %normalized.to_token.amount,
            "DEX venue produced direct route"
        );
        metrics::ADAPTER_REQUESTS
            .with_label_values(&[&self.id, "found"])
            .inc();
        Ok(Some(normalized))
    }
}
