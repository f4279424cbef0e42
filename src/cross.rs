//! # Cross-Chain Route Composition
//!
//! Stitches a same-chain leg on the source chain, an external bridge quote,
//! and a same-chain leg on the destination chain. Bridgeable-token
//! candidates are explored in parallel and the complete composition with the
//! best final output wins; a candidate failing any leg drops out without
//! touching its siblings. A route comes back `None` only after every
//! candidate is exhausted.

use std::sync::Arc;

use ethers::types::{Address, U256};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::bridges::{BridgeQuote, BridgeQuoteProvider, BridgeQuoteRequest};
use crate::errors::RouteError;
use crate::path::SameChainFinder;
use crate::registry::{CrossChainTokenMap, TokenRegistry};
use crate::types::{BridgeLeg, CrossChainRoute, SameChainRoute};

pub struct CrossChainFinder {
    samechain: Arc<SameChainFinder>,
    tokens: Arc<TokenRegistry>,
    map: Arc<CrossChainTokenMap>,
    /// Priority order, lowest first.
    bridges: Vec<Arc<dyn BridgeQuoteProvider>>,
    /// Bounds candidate fan-out. Must stay distinct from the verifier's probe
    /// limiter: a candidate holds its permit across both same-chain legs, and
    /// those legs acquire probe permits underneath.
    semaphore: Arc<Semaphore>,
}

impl CrossChainFinder {
    pub fn new(
        samechain: Arc<SameChainFinder>,
        tokens: Arc<TokenRegistry>,
        map: Arc<CrossChainTokenMap>,
        mut bridges: Vec<Arc<dyn BridgeQuoteProvider>>,
        max_concurrency: usize,
    ) -> Self {
        bridges.sort_by_key(|b| b.priority());
        Self {
            samechain,
            tokens,
            map,
            bridges,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Composes the best source-leg + bridge + destination-leg route.
    #[instrument(skip(self), fields(from_chain = from_chain_id, to_chain = to_chain_id, amount_in = %amount_in))]
    #[allow(clippy::too_many_arguments)]
    pub async fn find(
        &self,
        from_token: Address,
        to_token: Address,
        from_chain_id: u64,
        to_chain_id: u64,
        amount_in: U256,
        recipient: Option<Address>,
        from_address: Option<Address>,
    ) -> Result<Option<CrossChainRoute>, RouteError> {
        if from_chain_id == to_chain_id {
            return Err(RouteError::InvalidRequest(
                "cross-chain finder called with identical chains".into(),
            ));
        }
        let bridgeable = self
            .tokens
            .bridgeable_tokens(from_chain_id)
            .map_err(|e| RouteError::Provider(e.to_string()))?
            .to_vec();
        if bridgeable.is_empty() {
            return Ok(None);
        }

        let mut tasks = FuturesUnordered::new();
        for bridge_token in bridgeable {
            let semaphore = self.semaphore.clone();
            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match self
                    .try_candidate(
                        bridge_token,
                        from_token,
                        to_token,
                        from_chain_id,
                        to_chain_id,
                        amount_in,
                        recipient,
                        from_address,
                    )
                    .await
                {
                    Ok(route) => route,
                    Err(e) => {
                        warn!(
                            bridge_token = %format!("{bridge_token:#x}"),
                            error = %e,
                            "Bridgeable candidate failed, continuing with siblings"
                        );
                        None
                    }
                }
            });
        }

        let mut best: Option<CrossChainRoute> = None;
        while let Some(outcome) = tasks.next().await {
            if let Some(route) = outcome {
                let better = best
                    .as_ref()
                    .map(|b| route.total_output > b.total_output)
                    .unwrap_or(true);
                if better {
                    best = Some(route);
                }
            }
        }
        Ok(best)
    }

    /// One bridgeable-token candidate: source leg, identity mapping, bridge
    /// quote for the exact source output, destination leg.
    #[allow(clippy::too_many_arguments)]
    async fn try_candidate(
        &self,
        bridge_token: Address,
        from_token: Address,
        to_token: Address,
        from_chain_id: u64,
        to_chain_id: u64,
        amount_in: U256,
        recipient: Option<Address>,
        from_address: Option<Address>,
    ) -> Result<Option<CrossChainRoute>, RouteError> {
        // (a) Source leg. The token this leg actually delivers flows
        // downstream, not the nominally requested bridge token.
        let source_route = if from_token == bridge_token {
            SameChainRoute::passthrough(from_token, from_chain_id, amount_in)
        } else {
            match self
                .samechain
                .find(from_token, bridge_token, from_chain_id, amount_in)
                .await?
            {
                Some(r) => r,
                None => {
                    debug!(
                        bridge_token = %format!("{bridge_token:#x}"),
                        "No source leg for candidate"
                    );
                    return Ok(None);
                }
            }
        };
        let delivered = source_route.delivered_token();

        // (b) Destination-chain identity of the delivered token.
        let Some(dest_bridge_token) = self.map.resolve(from_chain_id, delivered, to_chain_id)
        else {
            debug!(
                delivered = %format!("{delivered:#x}"),
                to_chain_id,
                "No destination mapping for delivered token, skipping candidate"
            );
            return Ok(None);
        };

        // (c) Bridge quote for the exact source-leg output.
        let request = BridgeQuoteRequest {
            from_chain_id,
            to_chain_id,
            from_token: delivered,
            to_token: dest_bridge_token,
            amount_in: source_route.output_amount,
            recipient,
            from_address,
        };
        let Some(quote) = self.fetch_bridge_quote(&request).await else {
            debug!(
                delivered = %format!("{delivered:#x}"),
                "No bridge provider quoted this candidate"
            );
            return Ok(None);
        };

        // (d) Destination leg from the token the bridge actually delivers.
        let dest_route = if quote.to_token == to_token {
            SameChainRoute::passthrough(to_token, to_chain_id, quote.amount_out)
        } else {
            match self
                .samechain
                .find(quote.to_token, to_token, to_chain_id, quote.amount_out)
                .await?
            {
                Some(r) => r,
                None => {
                    debug!(
                        dest_bridge_token = %format!("{:#x}", quote.to_token),
                        "No destination leg for candidate"
                    );
                    return Ok(None);
                }
            }
        };

        // (e) Compose. bridge.amount_in == source output by construction.
        let total_output = dest_route.output_amount;
        let route = CrossChainRoute {
            bridge: BridgeLeg {
                provider: quote.provider,
                from_chain_id,
                to_chain_id,
                from_token: delivered,
                to_token: quote.to_token,
                amount_in: source_route.output_amount,
                amount_out: quote.amount_out,
                estimated_time_secs: quote.estimated_time_secs,
                quote: quote.quote,
            },
            source_route,
            dest_route,
            total_output,
            chain_id: to_chain_id,
        };
        debug!(
            total_output = %route.total_output,
            provider = %route.bridge.provider,
            "Composed cross-chain candidate"
        );
        debug_assert!(route.holds_invariants());
        Ok(Some(route))
    }

    /// First provider in priority order that serves the pair and returns a
    /// quote. Provider failures are logged and the next provider is tried.
    async fn fetch_bridge_quote(&self, request: &BridgeQuoteRequest) -> Option<BridgeQuote> {
        for provider in &self.bridges {
            if !provider.supports(request.from_chain_id, request.to_chain_id) {
                continue;
            }
            match provider.fetch_quote(request).await {
                Ok(Some(quote)) => return Some(quote),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        from_chain = request.from_chain_id,
                        to_chain = request.to_chain_id,
                        error = %e,
                        "Bridge provider failed, trying next"
                    );
                }
            }
        }
        None
    }
}
