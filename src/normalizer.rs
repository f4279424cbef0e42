//! # Route Normalization
//!
//! Converts internal route records into the externally consumed
//! [`RouterRoute`] shape: human-readable amounts via integer formatting,
//! exchange rates, step lists with descriptions, summed fees and settlement
//! times, per-kind expiry TTLs, and unique route ids. This is the only place
//! `expires_at` is assigned.

use std::sync::Arc;

use chrono::Utc;
use ethers::types::{Address, U256};
use uuid::Uuid;

use crate::amounts::{exchange_rate, to_human};
use crate::config::RoutingSettings;
use crate::decimals::DecimalsCache;
use crate::errors::RegistryError;
use crate::registry::TokenRegistry;
use crate::types::{
    BridgeLeg, CrossChainRoute, FeeBreakdown, MultiHopRoute, RawPayload, RouteStep, RouterParams,
    RouterRoute, SameChainRoute, StepKind, StepToken, TokenInfo,
};

pub struct RouteNormalizer {
    tokens: Arc<TokenRegistry>,
    decimals: Arc<DecimalsCache>,
    routing: RoutingSettings,
}

impl RouteNormalizer {
    pub fn new(
        tokens: Arc<TokenRegistry>,
        decimals: Arc<DecimalsCache>,
        routing: RoutingSettings,
    ) -> Self {
        Self {
            tokens,
            decimals,
            routing,
        }
    }

    fn route_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn same_chain_expiry(&self) -> i64 {
        Utc::now().timestamp() + self.routing.same_chain_ttl_secs as i64
    }

    fn cross_chain_expiry(&self) -> i64 {
        Utc::now().timestamp() + self.routing.cross_chain_ttl_secs as i64
    }

    /// Symbol from the registry, or a shortened address for tokens nobody
    /// configured a symbol for.
    fn symbol(&self, chain_id: u64, token: Address) -> String {
        self.tokens
            .symbol(chain_id, token)
            .map(str::to_string)
            .unwrap_or_else(|| {
                let hex = format!("{token:#x}");
                format!("{}…{}", &hex[..6], &hex[hex.len() - 4..])
            })
    }

    /// Builds the `TokenInfo` endpoint record for a raw amount.
    pub async fn token_info(
        &self,
        chain_id: u64,
        token: Address,
        amount_units: U256,
    ) -> Result<TokenInfo, RegistryError> {
        let decimals = self.decimals.decimals(chain_id, token).await?;
        Ok(TokenInfo {
            chain_id,
            address: token,
            symbol: self.symbol(chain_id, token),
            amount: to_human(amount_units, decimals),
            amount_units,
            usd_value: None,
            decimals,
        })
    }

    async fn step_token(
        &self,
        chain_id: u64,
        token: Address,
        amount_units: U256,
    ) -> Result<StepToken, RegistryError> {
        let decimals = self.decimals.decimals(chain_id, token).await?;
        Ok(StepToken {
            address: token,
            amount: to_human(amount_units, decimals),
            symbol: Some(self.symbol(chain_id, token)),
        })
    }

    /// One swap step per traversed pair, chained token-for-token.
    async fn swap_steps(&self, route: &SameChainRoute) -> Result<Vec<RouteStep>, RegistryError> {
        let mut steps = Vec::with_capacity(route.pairs.len());
        for (i, (from, to)) in route.pairs.iter().enumerate() {
            let from_token = self
                .step_token(route.chain_id, *from, route.amounts[i])
                .await?;
            let to_token = self
                .step_token(route.chain_id, *to, route.amounts[i + 1])
                .await?;
            let description = format!(
                "Swap {} for {} on {}",
                from_token.symbol.as_deref().unwrap_or("?"),
                to_token.symbol.as_deref().unwrap_or("?"),
                route.dex_id
            );
            steps.push(RouteStep {
                kind: StepKind::Swap,
                chain_id: route.chain_id,
                from_token,
                to_token,
                protocol: route.dex_id.clone(),
                description,
            });
        }
        Ok(steps)
    }

    async fn bridge_step(&self, bridge: &BridgeLeg) -> Result<RouteStep, RegistryError> {
        let from_token = self
            .step_token(bridge.from_chain_id, bridge.from_token, bridge.amount_in)
            .await?;
        let to_token = self
            .step_token(bridge.to_chain_id, bridge.to_token, bridge.amount_out)
            .await?;
        let description = format!(
            "Bridge {} from chain {} to chain {} via {}",
            from_token.symbol.as_deref().unwrap_or("?"),
            bridge.from_chain_id,
            bridge.to_chain_id,
            bridge.provider
        );
        Ok(RouteStep {
            kind: StepKind::Bridge,
            chain_id: bridge.from_chain_id,
            from_token,
            to_token,
            protocol: bridge.provider.clone(),
            description,
        })
    }

    fn same_chain_time_secs(&self, route: &SameChainRoute) -> u64 {
        let block_time = self.tokens.avg_block_time_secs(route.chain_id);
        (block_time * route.hops.max(1) as f64).ceil() as u64
    }

    /// Normalizes a verified same-chain route. `amount_in` is the requested
    /// input in smallest units.
    pub async fn same_chain(
        &self,
        route: &SameChainRoute,
        amount_in: U256,
        slippage: f64,
    ) -> Result<RouterRoute, RegistryError> {
        let from_token = self
            .token_info(route.chain_id, route.input_token(), amount_in)
            .await?;
        let to_token = self
            .token_info(route.chain_id, route.delivered_token(), route.output_amount)
            .await?;
        let rate = exchange_rate(&from_token.amount, &to_token.amount);
        Ok(RouterRoute {
            venue: route.dex_id.clone(),
            route_id: Self::route_id(),
            exchange_rate: rate,
            price_impact: 0.0,
            slippage,
            fees: FeeBreakdown::default(),
            steps: self.swap_steps(route).await?,
            estimated_time_secs: self.same_chain_time_secs(route),
            expires_at: self.same_chain_expiry(),
            raw: None,
            from_token,
            to_token,
        })
    }

    /// Normalizes a composed cross-chain route into one combined record. The
    /// opaque bridge quote rides along in `raw` for the execution layer.
    pub async fn cross_chain(
        &self,
        route: &CrossChainRoute,
        slippage: f64,
    ) -> Result<RouterRoute, RegistryError> {
        let source = &route.source_route;
        let dest = &route.dest_route;
        let from_token = self
            .token_info(
                source.chain_id,
                source.input_token(),
                source.amounts.first().copied().unwrap_or_default(),
            )
            .await?;
        let to_token = self
            .token_info(dest.chain_id, dest.delivered_token(), route.total_output)
            .await?;

        let mut steps = self.swap_steps(source).await?;
        steps.push(self.bridge_step(&route.bridge).await?);
        steps.extend(self.swap_steps(dest).await?);

        let estimated_time_secs = self.same_chain_time_secs(source)
            + route.bridge.estimated_time_secs
            + self.same_chain_time_secs(dest);
        let rate = exchange_rate(&from_token.amount, &to_token.amount);

        Ok(RouterRoute {
            venue: route.bridge.provider.clone(),
            route_id: Self::route_id(),
            exchange_rate: rate,
            price_impact: 0.0,
            slippage,
            fees: FeeBreakdown::default(),
            steps,
            estimated_time_secs,
            expires_at: self.cross_chain_expiry(),
            raw: Some(route.bridge.quote.clone()),
            from_token,
            to_token,
        })
    }

    /// Splits a cross-chain route into per-leg records plus the combined one,
    /// the shape the multi-hop contract returns.
    pub async fn cross_chain_bundle(
        &self,
        route: &CrossChainRoute,
        slippage: f64,
    ) -> Result<MultiHopRoute, RegistryError> {
        let amount_in = route
            .source_route
            .amounts
            .first()
            .copied()
            .unwrap_or_default();
        let mut legs = Vec::with_capacity(3);
        if route.source_route.hops > 0 {
            legs.push(
                self.same_chain(&route.source_route, amount_in, slippage)
                    .await?,
            );
        }
        legs.push(self.bridge_leg_route(&route.bridge, slippage).await?);
        if route.dest_route.hops > 0 {
            legs.push(
                self.same_chain(&route.dest_route, route.bridge.amount_out, slippage)
                    .await?,
            );
        }
        let combined = self.cross_chain(route, slippage).await?;
        Ok(MultiHopRoute { legs, combined })
    }

    async fn bridge_leg_route(
        &self,
        bridge: &BridgeLeg,
        slippage: f64,
    ) -> Result<RouterRoute, RegistryError> {
        let from_token = self
            .token_info(bridge.from_chain_id, bridge.from_token, bridge.amount_in)
            .await?;
        let to_token = self
            .token_info(bridge.to_chain_id, bridge.to_token, bridge.amount_out)
            .await?;
        let rate = exchange_rate(&from_token.amount, &to_token.amount);
        Ok(RouterRoute {
            venue: bridge.provider.clone(),
            route_id: Self::route_id(),
            exchange_rate: rate,
            price_impact: 0.0,
            slippage,
            fees: FeeBreakdown::default(),
            steps: vec![self.bridge_step(bridge).await?],
            estimated_time_secs: bridge.estimated_time_secs,
            expires_at: self.cross_chain_expiry(),
            raw: Some(bridge.quote.clone()),
            from_token,
            to_token,
        })
    }

    /// Normalizes a venue adapter's quote for a single pair. Used by the
    /// adapters so every venue emits the same record shape.
    #[allow(clippy::too_many_arguments)]
    pub async fn venue_route(
        &self,
        venue: &str,
        params: &RouterParams,
        amount_out: U256,
        estimated_time_secs: u64,
        fees: FeeBreakdown,
        raw: Option<RawPayload>,
    ) -> Result<RouterRoute, RegistryError> {
        let from_token = self
            .token_info(params.from_chain_id, params.from_token, params.from_amount)
            .await?;
        let to_token = self
            .token_info(params.to_chain_id, params.to_token, amount_out)
            .await?;
        let kind = if params.is_cross_chain() {
            StepKind::Bridge
        } else {
            StepKind::Swap
        };
        let step = RouteStep {
            kind,
            chain_id: params.from_chain_id,
            from_token: StepToken {
                address: from_token.address,
                amount: from_token.amount.clone(),
                symbol: Some(from_token.symbol.clone()),
            },
            to_token: StepToken {
                address: to_token.address,
                amount: to_token.amount.clone(),
                symbol: Some(to_token.symbol.clone()),
            },
            protocol: venue.to_string(),
            description: format!(
                "{} {} for {} via {}",
                if params.is_cross_chain() { "Bridge" } else { "Swap" },
                from_token.symbol,
                to_token.symbol,
                venue
            ),
        };
        let expires_at = if params.is_cross_chain() {
            self.cross_chain_expiry()
        } else {
            self.same_chain_expiry()
        };
        let rate = exchange_rate(&from_token.amount, &to_token.amount);
        Ok(RouterRoute {
            venue: venue.to_string(),
            route_id: Self::route_id(),
            exchange_rate: rate,
            price_impact: 0.0,
            slippage: params.slippage,
            fees,
            steps: vec![step],
            estimated_time_secs,
            expires_at,
            raw,
            from_token,
            to_token,
        })
    }

    /// Concatenates consecutive legs into one executable record: steps
    /// appended leg by leg, fees and times summed, the earliest leg expiry
    /// kept so the combined route never outlives a member.
    pub async fn combine_legs(&self, legs: &[RouterRoute]) -> Result<RouterRoute, RegistryError> {
        let (Some(first), Some(last)) = (legs.first(), legs.last()) else {
            return Err(RegistryError::EmptyRoute);
        };

        let mut steps = Vec::new();
        let mut fees = FeeBreakdown::default();
        let mut estimated_time_secs = 0u64;
        let mut price_impact = 0.0;
        let mut expires_at = i64::MAX;
        for leg in legs {
            steps.extend(leg.steps.iter().cloned());
            fees = fees.combine(&leg.fees);
            estimated_time_secs += leg.estimated_time_secs;
            price_impact += leg.price_impact;
            expires_at = expires_at.min(leg.expires_at);
        }

        let venue = legs
            .iter()
            .map(|l| l.venue.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let rate = exchange_rate(&first.from_token.amount, &last.to_token.amount);
        Ok(RouterRoute {
            venue,
            route_id: Self::route_id(),
            from_token: first.from_token.clone(),
            to_token: last.to_token.clone(),
            exchange_rate: rate,
            price_impact,
            slippage: first.slippage,
            fees,
            steps,
            estimated_time_secs,
            expires_at,
            raw: None,
        })
    }
}
