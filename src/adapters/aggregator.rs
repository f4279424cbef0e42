//! HTTP aggregator venue. Talks to an external quote endpoint over reqwest,
//! guarded by a per-venue circuit breaker so a flapping provider stops
//! eating the discovery budget. The provider's quote body rides along as the
//! venue-tagged opaque payload for the execution layer.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ethers::types::U256;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::AggregatorVenueConfig;
use crate::errors::AdapterError;
use crate::metrics;
use crate::normalizer::RouteNormalizer;
use crate::types::{FeeBreakdown, RawPayload, RouterParams, RouterRoute};

use super::VenueAdapter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SWAP_TIME_SECS: u64 = 30;
const DEFAULT_BRIDGE_TIME_SECS: u64 = 300;

/// Consecutive failures before the breaker trips.
const FAILURE_THRESHOLD_TO_TRIP: u32 = 5;
/// Cooldown after a trip; afterwards the breaker half-opens.
const CIRCUIT_BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

/// Wire shape of an aggregator quote reply. Field names follow the common
/// aggregator convention; everything beyond `toAmount` is optional.
#[derive(Debug, Clone, Deserialize)]
struct AggregatorQuoteReply {
    #[serde(rename = "toAmount")]
    to_amount: String,
    #[serde(rename = "toToken")]
    #[allow(dead_code)]
    to_token: Option<String>,
    #[serde(rename = "estimatedTime")]
    estimated_time_secs: Option<u64>,
    #[serde(rename = "feeUsd")]
    fee_usd: Option<String>,
    #[serde(rename = "gasUsd")]
    gas_usd: Option<String>,
}

pub struct AggregatorVenueAdapter {
    name: String,
    base_url: String,
    priority: u32,
    chains: Vec<u64>,
    cross_chain: bool,
    api_key: Option<String>,
    client: Client,
    breaker: CircuitBreaker,
    normalizer: Arc<RouteNormalizer>,
}

impl fmt::Debug for AggregatorVenueAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorVenueAdapter")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("priority", &self.priority)
            .field("chains", &self.chains)
            .field("cross_chain", &self.cross_chain)
            .finish()
    }
}

impl AggregatorVenueAdapter {
    pub fn new(config: &AggregatorVenueConfig, normalizer: Arc<RouteNormalizer>) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("routescout/0.3")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            priority: config.priority,
            chains: config.chains.clone(),
            cross_chain: config.supports_cross_chain,
            api_key: config.api_key.clone(),
            client,
            breaker: CircuitBreaker::new(FAILURE_THRESHOLD_TO_TRIP, CIRCUIT_BREAKER_COOLDOWN),
            normalizer,
        }
    }

    fn quote_url(&self, params: &RouterParams) -> String {
        let mut url = format!(
            "{}/quote?fromChainId={}&toChainId={}&fromToken={:#x}&toToken={:#x}&amount={}&slippage={}",
            self.base_url,
            params.from_chain_id,
            params.to_chain_id,
            params.from_token,
            params.to_token,
            params.from_amount,
            params.slippage,
        );
        if let Some(recipient) = params.recipient {
            url.push_str(&format!("&recipient={recipient:#x}"));
        }
        url
    }
}

#[async_trait]
impl VenueAdapter for AggregatorVenueAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn supports_chain(&self, chain_id: u64) -> bool {
        self.chains.contains(&chain_id)
    }

    fn supports_cross_chain(&self) -> bool {
        self.cross_chain
    }

    async fn get_route(&self, params: &RouterParams) -> Result<Option<RouterRoute>, AdapterError> {
        if !self.supports_chain(params.from_chain_id) {
            return Err(AdapterError::UnsupportedChain {
                venue: self.name.clone(),
                chain_id: params.from_chain_id,
            });
        }
        if params.is_cross_chain() && !self.cross_chain {
            return Err(AdapterError::UnsupportedPair {
                venue: self.name.clone(),
                from: params.from_token,
                to: params.to_token,
            });
        }
        if let Some(remaining) = self.breaker.open_for().await {
            return Err(AdapterError::CircuitOpen {
                venue: self.name.clone(),
                remaining_secs: remaining.as_secs(),
            });
        }

        let mut request = self.client.get(self.quote_url(params));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure().await;
                metrics::ADAPTER_REQUESTS
                    .with_label_values(&[&self.name, "http_error"])
                    .inc();
                return Err(AdapterError::Http {
                    venue: self.name.clone(),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| AdapterError::Http {
            venue: self.name.clone(),
            message: format!("failed to read body: {e}"),
        })?;

        if status == StatusCode::NOT_FOUND
            || (status == StatusCode::BAD_REQUEST && body.contains("insufficient liquidity"))
        {
            // The venue answered; it just has nothing for this pair.
            self.breaker.record_success().await;
            metrics::ADAPTER_REQUESTS
                .with_label_values(&[&self.name, "no_route"])
                .inc();
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.breaker.record_failure().await;
            return Err(AdapterError::RateLimited {
                venue: self.name.clone(),
            });
        }
        if !status.is_success() {
            self.breaker.record_failure().await;
            metrics::ADAPTER_REQUESTS
                .with_label_values(&[&self.name, "http_error"])
                .inc();
            return Err(AdapterError::Http {
                venue: self.name.clone(),
                message: format!("status {status}: {body}"),
            });
        }

        let payload: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| AdapterError::InvalidResponse {
                venue: self.name.clone(),
                message: format!("not JSON: {e}"),
            })?;
        let reply: AggregatorQuoteReply =
            serde_json::from_value(payload.clone()).map_err(|e| AdapterError::InvalidResponse {
                venue: self.name.clone(),
                message: e.to_string(),
            })?;
        let amount_out =
            U256::from_dec_str(&reply.to_amount).map_err(|e| AdapterError::InvalidResponse {
                venue: self.name.clone(),
                message: format!("toAmount '{}' is not an integer: {e}", reply.to_amount),
            })?;
        self.breaker.record_success().await;

        if amount_out.is_zero() {
            metrics::ADAPTER_REQUESTS
                .with_label_values(&[&self.name, "no_route"])
                .inc();
            return Ok(None);
        }

        let mut fees = FeeBreakdown::default();
        if let Some(fee) = reply.fee_usd {
            fees.protocol_usd = fee;
        }
        if let Some(gas) = reply.gas_usd {
            fees.gas_usd = gas;
        }
        fees.total_usd = {
            let total = fees.protocol_usd.parse::<f64>().unwrap_or(0.0)
                + fees.gas_usd.parse::<f64>().unwrap_or(0.0);
            if total == 0.0 {
                "0".into()
            } else {
                format!("{total:.6}")
            }
        };

        let estimated_time = reply.estimated_time_secs.unwrap_or(if params.is_cross_chain() {
            DEFAULT_BRIDGE_TIME_SECS
        } else {
            DEFAULT_SWAP_TIME_SECS
        });
        let raw = RawPayload {
            venue: self.name.clone(),
            payload,
        };
        let route = self
            .normalizer
            .venue_route(&self.name, params, amount_out, estimated_time, fees, Some(raw))
            .await
            .map_err(|e| AdapterError::InvalidResponse {
                venue: self.name.clone(),
                message: e.to_string(),
            })?;
        debug!(venue = %self.name, out = %route.to_token.amount, "Aggregator produced route");
        metrics::ADAPTER_REQUESTS
            .with_label_values(&[&self.name, "found"])
            .inc();
        Ok(Some(route))
    }
}

//================================================================================================//
//                                      CIRCUIT BREAKER                                           //
//================================================================================================//

#[derive(Debug)]
struct BreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
}

/// Trip-after-N-consecutive-failures breaker with a cooldown and a half-open
/// state that lets probe traffic through at half the failure budget.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<BreakerState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: RwLock::new(BreakerState {
                failure_count: 0,
                open_until: None,
            }),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Remaining cooldown if the breaker is open; `None` means requests may
    /// proceed. Expiring the cooldown transitions to half-open.
    pub async fn open_for(&self) -> Option<Duration> {
        let mut state = self.state.write().await;
        if let Some(open_until) = state.open_until {
            let now = Instant::now();
            if now < open_until {
                return Some(open_until - now);
            }
            state.open_until = None;
            state.failure_count = self.threshold / 2;
        }
        None
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.failure_count = 0;
        state.open_until = None;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.failure_count += 1;
        if state.failure_count >= self.threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            warn!(
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker tripped, cooling down"
            );
        }
    }
}
