//! Multi-hop routing by brute-force parallel exploration: every configured
//! intermediary crossed with every registered venue adapter, twice. The
//! adapters do not know about each other's liquidity, so only the double
//! fan-out finds the global best two-hop chain. Cross-chain requests
//! delegate to the cross-chain finder and come back as a three-leg bundle.

use std::sync::Arc;

use ethers::types::{Address, U256};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::amounts::from_human;
use crate::adapters::{AdapterRegistry, VenueAdapter};
use crate::cross::CrossChainFinder;
use crate::errors::RouteError;
use crate::normalizer::RouteNormalizer;
use crate::registry::TokenRegistry;
use crate::types::{MultiHopRoute, RouterParams, RouterRoute};

pub struct MultiHopRouter {
    adapters: Arc<AdapterRegistry>,
    tokens: Arc<TokenRegistry>,
    normalizer: Arc<RouteNormalizer>,
    cross: Arc<CrossChainFinder>,
    /// Bounds fan-out breadth. Must stay distinct from the verifier's probe
    /// limiter: a branch holds its permit across the whole leg, and the leg
    /// acquires probe permits underneath.
    semaphore: Arc<Semaphore>,
}

impl MultiHopRouter {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        tokens: Arc<TokenRegistry>,
        normalizer: Arc<RouteNormalizer>,
        cross: Arc<CrossChainFinder>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            adapters,
            tokens,
            normalizer,
            cross,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Finds the best multi-hop bundle, or `Ok(None)` when no two-leg chain
    /// completes. Individual adapter failures are isolated per branch.
    #[instrument(skip(self, params), fields(from_chain = params.from_chain_id, to_chain = params.to_chain_id, amount_in = %params.from_amount))]
    pub async fn find(&self, params: &RouterParams) -> Result<Option<MultiHopRoute>, RouteError> {
        if params.is_cross_chain() {
            return self.find_cross_chain(params).await;
        }
        self.find_same_chain(params).await
    }

    async fn find_cross_chain(
        &self,
        params: &RouterParams,
    ) -> Result<Option<MultiHopRoute>, RouteError> {
        let Some(route) = self
            .cross
            .find(
                params.from_token,
                params.to_token,
                params.from_chain_id,
                params.to_chain_id,
                params.from_amount,
                params.recipient,
                None,
            )
            .await?
        else {
            return Ok(None);
        };
        let bundle = self
            .normalizer
            .cross_chain_bundle(&route, params.slippage)
            .await
            .map_err(|e| RouteError::Provider(e.to_string()))?;
        Ok(Some(bundle))
    }

    async fn find_same_chain(
        &self,
        params: &RouterParams,
    ) -> Result<Option<MultiHopRoute>, RouteError> {
        let chain_id = params.from_chain_id;
        let adapters = self.adapters.for_chain(chain_id);
        if adapters.is_empty() {
            debug!(chain_id, "No adapters serve this chain");
            return Ok(None);
        }
        let intermediaries: Vec<Address> = self
            .tokens
            .multihop_tokens(chain_id)
            .map_err(|e| RouteError::Provider(e.to_string()))?
            .iter()
            .copied()
            .filter(|i| *i != params.from_token && *i != params.to_token)
            .collect();
        if intermediaries.is_empty() {
            return Ok(None);
        }

        // First fan-out: from_token -> every intermediary, on every adapter.
        let first_legs = self
            .fan_out(
                &adapters,
                intermediaries
                    .iter()
                    .map(|i| self.leg_params(params, params.from_token, *i, params.from_amount))
                    .collect(),
            )
            .await;
        if first_legs.is_empty() {
            return Ok(None);
        }

        // Second fan-out: each delivered intermediary amount -> to_token.
        let mut second_requests = Vec::new();
        let mut leg_index = Vec::new();
        for (idx, leg) in first_legs.iter().enumerate() {
            let intermediary = leg.to_token.address;
            let amount = match from_human(&leg.to_token.amount, leg.to_token.decimals) {
                Ok(a) => a,
                Err(e) => {
                    warn!(
                        intermediary = %format!("{intermediary:#x}"),
                        amount = %leg.to_token.amount,
                        error = %e,
                        "Dropping first leg with unparseable output amount"
                    );
                    continue;
                }
            };
            if amount.is_zero() {
                continue;
            }
            second_requests.push(self.leg_params(params, intermediary, params.to_token, amount));
            leg_index.push(idx);
        }
        if second_requests.is_empty() {
            return Ok(None);
        }

        let mut best: Option<(usize, RouterRoute)> = None;
        for (slot, second_leg) in self
            .fan_out_indexed(&adapters, second_requests)
            .await
            .into_iter()
        {
            let better = best
                .as_ref()
                .map(|(_, b)| second_leg.output_units() > b.output_units())
                .unwrap_or(true);
            if better {
                best = Some((leg_index[slot], second_leg));
            }
        }

        let Some((first_idx, second_leg)) = best else {
            return Ok(None);
        };
        let first_leg = first_legs[first_idx].clone();
        debug!(
            intermediary = %format!("{:#x}", first_leg.to_token.address),
            first_venue = %first_leg.venue,
            second_venue = %second_leg.venue,
            out = %second_leg.to_token.amount,
            "Selected best two-hop chain"
        );
        let combined = self
            .normalizer
            .combine_legs(&[first_leg.clone(), second_leg.clone()])
            .await
            .map_err(|e| RouteError::Provider(e.to_string()))?;
        Ok(Some(MultiHopRoute {
            legs: vec![first_leg, second_leg],
            combined,
        }))
    }

    fn leg_params(
        &self,
        base: &RouterParams,
        from_token: Address,
        to_token: Address,
        amount: U256,
    ) -> RouterParams {
        RouterParams {
            from_chain_id: base.from_chain_id,
            from_token,
            from_amount: amount,
            to_chain_id: base.from_chain_id,
            to_token,
            recipient: base.recipient,
            slippage: base.slippage,
            order: base.order,
        }
    }

    /// Asks every adapter for every request concurrently under the shared
    /// bound; failures are logged and dropped, successes collected.
    async fn fan_out(
        &self,
        adapters: &[Arc<dyn VenueAdapter>],
        requests: Vec<RouterParams>,
    ) -> Vec<RouterRoute> {
        self.fan_out_indexed(adapters, requests)
            .await
            .into_iter()
            .map(|(_, route)| route)
            .collect()
    }

    async fn fan_out_indexed(
        &self,
        adapters: &[Arc<dyn VenueAdapter>],
        requests: Vec<RouterParams>,
    ) -> Vec<(usize, RouterRoute)> {
        let mut tasks = FuturesUnordered::new();
        for (slot, request) in requests.into_iter().enumerate() {
            for adapter in adapters {
                let adapter = adapter.clone();
                let request = request.clone();
                let semaphore = self.semaphore.clone();
                tasks.push(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    match adapter.get_route(&request).await {
                        Ok(Some(route)) => Some((slot, route)),
                        Ok(None) => None,
                        Err(e) => {
                            warn!(
                                venue = adapter.name(),
                                chain_id = request.from_chain_id,
                                from = %format!("{:#x}", request.from_token),
                                to = %format!("{:#x}", request.to_token),
                                amount = %request.from_amount,
                                error = %e,
                                "Adapter leg failed, continuing with siblings"
                            );
                            None
                        }
                    }
                });
            }
        }
        let mut results = Vec::new();
        while let Some(outcome) = tasks.next().await {
            if let Some(hit) = outcome {
                results.push(hit);
            }
        }
        results
    }
}
