//! # Route Engine
//!
//! The public entry point: validates the canonical request synchronously,
//! dispatches to the same-chain finder and multi-hop router (concurrently)
//! or the cross-chain finder, normalizes every candidate, and returns the
//! best by final output with the runners-up as alternatives. The whole
//! discovery runs under one wall-clock budget; exhaustion is `Ok(None)`,
//! never an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::amounts::from_human;
use crate::config::RoutingSettings;
use crate::cross::CrossChainFinder;
use crate::decimals::DecimalsCache;
use crate::errors::RouteError;
use crate::metrics;
use crate::normalizer::RouteNormalizer;
use crate::path::{MultiHopRouter, SameChainFinder};
use crate::registry::TokenRegistry;
use crate::types::{
    RouteOrder, RouteRequest, RouteResponse, RouterParams, RouterRoute, DEFAULT_SLIPPAGE_PCT,
};

const MAX_SLIPPAGE_PCT: f64 = 50.0;

pub struct RouteEngine {
    samechain: Arc<SameChainFinder>,
    multihop: Arc<MultiHopRouter>,
    cross: Arc<CrossChainFinder>,
    normalizer: Arc<RouteNormalizer>,
    tokens: Arc<TokenRegistry>,
    decimals: Arc<DecimalsCache>,
    routing: RoutingSettings,
    shutdown: CancellationToken,
}

impl RouteEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        samechain: Arc<SameChainFinder>,
        multihop: Arc<MultiHopRouter>,
        cross: Arc<CrossChainFinder>,
        normalizer: Arc<RouteNormalizer>,
        tokens: Arc<TokenRegistry>,
        decimals: Arc<DecimalsCache>,
        routing: RoutingSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            samechain,
            multihop,
            cross,
            normalizer,
            tokens,
            decimals,
            routing,
            shutdown,
        }
    }

    /// Discovers the best route for a canonical request. `Ok(None)` means
    /// every strategy and candidate was exhausted.
    #[instrument(skip(self, request), fields(from_chain = request.from_chain_id, to_chain = request.to_chain_id, amount = %request.amount))]
    pub async fn find_routes(
        &self,
        request: &RouteRequest,
    ) -> Result<Option<RouteResponse>, RouteError> {
        if self.shutdown.is_cancelled() {
            return Err(RouteError::Shutdown);
        }
        let params = self.validate(request).await?;
        let kind = if params.is_cross_chain() {
            "cross_chain"
        } else {
            "same_chain"
        };
        let started = Instant::now();
        let budget = Duration::from_millis(self.routing.overall_deadline_ms);

        let discovery = async {
            if params.is_cross_chain() {
                self.discover_cross_chain(&params).await
            } else {
                self.discover_same_chain(&params).await
            }
        };
        let candidates = tokio::select! {
            result = timeout(budget, discovery) => {
                match result {
                    Ok(candidates) => candidates?,
                    Err(_) => {
                        metrics::ROUTE_REQUESTS
                            .with_label_values(&[kind, "deadline"])
                            .inc();
                        return Err(RouteError::DeadlineExceeded(
                            self.routing.overall_deadline_ms,
                        ));
                    }
                }
            }
            _ = self.shutdown.cancelled() => return Err(RouteError::Shutdown),
        };
        metrics::DISCOVERY_DURATION
            .with_label_values(&[kind])
            .observe(started.elapsed().as_secs_f64());

        let Some(response) = Self::select_best(candidates, self.routing.max_alternatives) else {
            info!(kind, "Discovery exhausted every strategy, no route");
            metrics::ROUTE_REQUESTS
                .with_label_values(&[kind, "no_route"])
                .inc();
            return Ok(None);
        };
        debug!(
            kind,
            route_id = %response.route.route_id,
            venue = %response.route.venue,
            out = %response.route.to_token.amount,
            alternatives = response.alternatives.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery selected best route"
        );
        metrics::ROUTE_REQUESTS
            .with_label_values(&[kind, "found"])
            .inc();
        Ok(Some(response))
    }

    /// Synchronous request validation; rejects before any network call.
    async fn validate(&self, request: &RouteRequest) -> Result<RouterParams, RouteError> {
        if !self.tokens.supports_chain(request.from_chain_id) {
            return Err(RouteError::UnsupportedChain(request.from_chain_id));
        }
        if !self.tokens.supports_chain(request.to_chain_id) {
            return Err(RouteError::UnsupportedChain(request.to_chain_id));
        }
        if request.from_chain_id == request.to_chain_id && request.from_token == request.to_token {
            return Err(RouteError::InvalidRequest(
                "from and to are the same token on the same chain".into(),
            ));
        }
        let slippage = request.slippage.unwrap_or(DEFAULT_SLIPPAGE_PCT);
        if !(0.0..=MAX_SLIPPAGE_PCT).contains(&slippage) {
            return Err(RouteError::InvalidRequest(format!(
                "slippage {slippage} out of range 0..={MAX_SLIPPAGE_PCT}"
            )));
        }
        let decimals = self
            .decimals
            .decimals(request.from_chain_id, request.from_token)
            .await
            .map_err(|e| RouteError::InvalidRequest(e.to_string()))?;
        let from_amount = from_human(&request.amount, decimals)
            .map_err(|e| RouteError::InvalidRequest(e.to_string()))?;
        if from_amount.is_zero() {
            return Err(RouteError::InvalidRequest("amount is zero".into()));
        }
        Ok(RouterParams {
            from_chain_id: request.from_chain_id,
            from_token: request.from_token,
            from_amount,
            to_chain_id: request.to_chain_id,
            to_token: request.to_token,
            recipient: request.recipient,
            slippage,
            order: RouteOrder::default(),
        })
    }

    /// Same-chain: the tiered finder and the multi-hop fan-out race
    /// concurrently; both contribute candidates.
    async fn discover_same_chain(
        &self,
        params: &RouterParams,
    ) -> Result<Vec<RouterRoute>, RouteError> {
        let (tiered, multihop) = tokio::join!(
            self.samechain.find(
                params.from_token,
                params.to_token,
                params.from_chain_id,
                params.from_amount,
            ),
            self.multihop.find(params),
        );

        let mut candidates = Vec::new();
        match tiered {
            Ok(Some(route)) => {
                let normalized = self
                    .normalizer
                    .same_chain(&route, params.from_amount, params.slippage)
                    .await
                    .map_err(|e| RouteError::Provider(e.to_string()))?;
                candidates.push(normalized);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Tiered same-chain finder failed"),
        }
        match multihop {
            Ok(Some(bundle)) => candidates.push(bundle.combined),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Multi-hop router failed"),
        }

        Ok(candidates)
    }

    async fn discover_cross_chain(
        &self,
        params: &RouterParams,
    ) -> Result<Vec<RouterRoute>, RouteError> {
        let route = self
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
            .await?;
        let Some(route) = route else {
            return Ok(Vec::new());
        };
        let normalized = self
            .normalizer
            .cross_chain(&route, params.slippage)
            .await
            .map_err(|e| RouteError::Provider(e.to_string()))?;
        Ok(vec![normalized])
    }

    /// Best candidate by final output; the rest become alternatives, best
    /// first, capped.
    fn select_best(mut candidates: Vec<RouterRoute>, max_alternatives: usize) -> Option<RouteResponse> {
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| b.output_units().cmp(&a.output_units()));
        let route = candidates.remove(0);
        candidates.truncate(max_alternatives);
        let expires_at = route.expires_at;
        Some(RouteResponse {
            route,
            alternatives: candidates,
            timestamp: Utc::now().timestamp(),
            expires_at,
        })
    }
}
