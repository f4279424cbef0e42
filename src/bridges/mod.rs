//! # Bridge Quote Boundary
//!
//! The cross-chain finder consumes this trait; how a provider prices a
//! transfer (HTTP quote API, on-chain liquidity read) is implementation
//! detail. `Ok(None)` means "this provider has no route for the pair", not a
//! failure. The provider's quote body is kept opaque behind a venue tag so
//! only the matching execution-layer component ever deserializes it.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::BridgeProviderConfig;
use crate::errors::BridgeError;
use crate::metrics;
use crate::types::RawPayload;

const HTTP_TIMEOUT: Duration = Duration::from_secs(6);
const DEFAULT_BRIDGE_TIME_SECS: u64 = 600;

/// Everything a provider needs to price one transfer.
#[derive(Debug, Clone)]
pub struct BridgeQuoteRequest {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Address,
    /// Requested destination token; the provider may substitute an
    /// equivalent asset and reports what it delivers in the quote.
    pub to_token: Address,
    pub amount_in: U256,
    pub recipient: Option<Address>,
    pub from_address: Option<Address>,
}

/// A priced transfer. `to_token` is the token the bridge actually delivers,
/// which may differ from the one requested.
#[derive(Debug, Clone)]
pub struct BridgeQuote {
    pub provider: String,
    pub to_token: Address,
    pub amount_out: U256,
    pub estimated_time_secs: u64,
    pub quote: RawPayload,
}

#[async_trait]
pub trait BridgeQuoteProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Lower values are tried first.
    fn priority(&self) -> u32;

    fn supports(&self, from_chain_id: u64, to_chain_id: u64) -> bool;

    async fn fetch_quote(
        &self,
        request: &BridgeQuoteRequest,
    ) -> Result<Option<BridgeQuote>, BridgeError>;
}

/// Wire shape of a bridge quote reply.
#[derive(Debug, Clone, Deserialize)]
struct BridgeQuoteReply {
    #[serde(rename = "toAmount")]
    to_amount: String,
    /// Delivered token when the provider substitutes an equivalent asset.
    #[serde(rename = "toToken")]
    to_token: Option<Address>,
    #[serde(rename = "estimatedTime")]
    estimated_time_secs: Option<u64>,
}

/// Generic HTTP bridge provider speaking the common quote-endpoint shape.
pub struct HttpBridgeProvider {
    name: String,
    base_url: String,
    priority: u32,
    client: Client,
}

impl fmt::Debug for HttpBridgeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBridgeProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("priority", &self.priority)
            .finish()
    }
}

impl HttpBridgeProvider {
    pub fn new(config: &BridgeProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("routescout/0.3")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            priority: config.priority,
            client,
        }
    }

    fn quote_url(&self, request: &BridgeQuoteRequest) -> String {
        let mut url = format!(
            "{}/quote?fromChain={}&toChain={}&fromToken={:#x}&toToken={:#x}&fromAmount={}",
            self.base_url,
            request.from_chain_id,
            request.to_chain_id,
            request.from_token,
            request.to_token,
            request.amount_in,
        );
        if let Some(recipient) = request.recipient {
            url.push_str(&format!("&toAddress={recipient:#x}"));
        }
        if let Some(from) = request.from_address {
            url.push_str(&format!("&fromAddress={from:#x}"));
        }
        url
    }
}

#[async_trait]
impl BridgeQuoteProvider for HttpBridgeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn supports(&self, from_chain_id: u64, to_chain_id: u64) -> bool {
        from_chain_id != to_chain_id
    }

    async fn fetch_quote(
        &self,
        request: &BridgeQuoteRequest,
    ) -> Result<Option<BridgeQuote>, BridgeError> {
        let response = self
            .client
            .get(self.quote_url(request))
            .send()
            .await
            .map_err(|e| {
                metrics::BRIDGE_QUOTES
                    .with_label_values(&[&self.name, "http_error"])
                    .inc();
                if e.is_timeout() {
                    BridgeError::Timeout(HTTP_TIMEOUT.as_millis() as u64)
                } else {
                    BridgeError::Http {
                        provider: self.name.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| BridgeError::Http {
            provider: self.name.clone(),
            message: format!("failed to read body: {e}"),
        })?;

        if status == StatusCode::NOT_FOUND {
            metrics::BRIDGE_QUOTES
                .with_label_values(&[&self.name, "no_route"])
                .inc();
            return Ok(None);
        }
        if !status.is_success() {
            metrics::BRIDGE_QUOTES
                .with_label_values(&[&self.name, "http_error"])
                .inc();
            return Err(BridgeError::Http {
                provider: self.name.clone(),
                message: format!("status {status}: {body}"),
            });
        }

        let payload: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| BridgeError::InvalidResponse {
                provider: self.name.clone(),
                message: format!("not JSON: {e}"),
            })?;
        let reply: BridgeQuoteReply =
            serde_json::from_value(payload.clone()).map_err(|e| BridgeError::InvalidResponse {
                provider: self.name.clone(),
                message: e.to_string(),
            })?;
        let amount_out =
            U256::from_dec_str(&reply.to_amount).map_err(|e| BridgeError::InvalidResponse {
                provider: self.name.clone(),
                message: format!("toAmount '{}' is not an integer: {e}", reply.to_amount),
            })?;
        if amount_out.is_zero() {
            metrics::BRIDGE_QUOTES
                .with_label_values(&[&self.name, "no_route"])
                .inc();
            return Ok(None);
        }

        debug!(
            provider = %self.name,
            from_chain = request.from_chain_id,
            to_chain = request.to_chain_id,
            amount_out = %amount_out,
            "Bridge quote received"
        );
        metrics::BRIDGE_QUOTES
            .with_label_values(&[&self.name, "found"])
            .inc();
        Ok(Some(BridgeQuote {
            provider: self.name.clone(),
            to_token: reply.to_token.unwrap_or(request.to_token),
            amount_out,
            estimated_time_secs: reply.estimated_time_secs.unwrap_or(DEFAULT_BRIDGE_TIME_SECS),
            quote: RawPayload {
                venue: self.name.clone(),
                payload,
            },
        }))
    }
}
