//! # Core Type Definitions
//!
//! Single source of truth for the value objects passed between the finders,
//! the verifier, the normalizer, and the consumer boundary. Everything here
//! is a short-lived, read-only record created per discovery call; nothing in
//! this module owns I/O.

use std::fmt;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

//================================================================================================//
//                                      TOKEN PATHS                                               //
//================================================================================================//

/// Ordered token path for a same-chain route. Inline capacity covers every
/// realistic hop count without heap allocation.
pub type TokenPath = SmallVec<[Address; 8]>;

/// Renders a path as `0xaaaa… -> 0xbbbb…` for logs.
pub fn format_path(path: &[Address]) -> String {
    path.iter()
        .map(|a| format!("{a:#x}"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A path is malformed if it is empty or repeats a token in adjacent
/// positions (a zero-length hop).
pub fn has_adjacent_duplicates(path: &[Address]) -> bool {
    path.windows(2).any(|w| w[0] == w[1])
}

//================================================================================================//
//                               VENUE PARAMETERS & NORMALIZED ROUTES                             //
//================================================================================================//

/// Default slippage tolerance, percent.
pub const DEFAULT_SLIPPAGE_PCT: f64 = 0.5;

/// Route ordering preference supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouteOrder {
    /// Maximize final output amount.
    #[default]
    BestOutput,
    /// Minimize estimated settlement time.
    Fastest,
}

/// Immutable parameter block handed to venue adapters. Constructed once by
/// the core from canonical inputs; venue-specific fields never leak back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterParams {
    pub from_chain_id: u64,
    pub from_token: Address,
    /// Smallest-unit input amount.
    pub from_amount: U256,
    pub to_chain_id: u64,
    pub to_token: Address,
    pub recipient: Option<Address>,
    /// Percent, e.g. 0.5 for 0.5%.
    pub slippage: f64,
    pub order: RouteOrder,
}

impl RouterParams {
    pub fn new(
        from_chain_id: u64,
        from_token: Address,
        from_amount: U256,
        to_chain_id: u64,
        to_token: Address,
    ) -> Self {
        Self {
            from_chain_id,
            from_token,
            from_amount,
            to_chain_id,
            to_token,
            recipient: None,
            slippage: DEFAULT_SLIPPAGE_PCT,
            order: RouteOrder::default(),
        }
    }

    pub fn with_recipient(mut self, recipient: Option<Address>) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn is_cross_chain(&self) -> bool {
        self.from_chain_id != self.to_chain_id
    }
}

/// One endpoint of a normalized route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub chain_id: u64,
    pub address: Address,
    pub symbol: String,
    /// Human-readable amount, integer-division formatted.
    pub amount: String,
    /// Same amount in smallest units.
    pub amount_units: U256,
    pub usd_value: Option<f64>,
    pub decimals: u8,
}

/// USD-denominated fee summary. All strings because downstream consumers
/// render them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub protocol_usd: String,
    pub gas_usd: String,
    pub platform_usd: String,
    pub total_usd: String,
}

impl Default for FeeBreakdown {
    fn default() -> Self {
        Self {
            protocol_usd: "0".into(),
            gas_usd: "0".into(),
            platform_usd: "0".into(),
            total_usd: "0".into(),
        }
    }
}

impl FeeBreakdown {
    /// Sums two fee summaries field by field. USD strings are decimal text,
    /// so float addition here does not touch raw token amounts.
    pub fn combine(&self, other: &FeeBreakdown) -> FeeBreakdown {
        fn add(a: &str, b: &str) -> String {
            let sum = a.parse::<f64>().unwrap_or(0.0) + b.parse::<f64>().unwrap_or(0.0);
            if sum == 0.0 {
                "0".into()
            } else {
                format!("{sum:.6}")
            }
        }
        FeeBreakdown {
            protocol_usd: add(&self.protocol_usd, &other.protocol_usd),
            gas_usd: add(&self.gas_usd, &other.gas_usd),
            platform_usd: add(&self.platform_usd, &other.platform_usd),
            total_usd: add(&self.total_usd, &other.total_usd),
        }
    }
}

/// Kind of a single execution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Swap,
    Bridge,
    Wrap,
    Unwrap,
}

/// Token endpoint of a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepToken {
    pub address: Address,
    pub amount: String,
    pub symbol: Option<String>,
}

/// One leg of the execution plan. Steps are ordered; consecutive steps chain
/// token-for-token except across a bridge, where the destination token is
/// resolved independently on the other chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub chain_id: u64,
    pub from_token: StepToken,
    pub to_token: StepToken,
    pub protocol: String,
    pub description: String,
}

/// Venue-tagged opaque payload. Only the execution component matching
/// `venue` may deserialize `payload`; the core never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPayload {
    pub venue: String,
    pub payload: serde_json::Value,
}

/// Normalized route record, the externally consumed output of discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouterRoute {
    /// Producing venue label.
    pub venue: String,
    pub route_id: String,
    pub from_token: TokenInfo,
    pub to_token: TokenInfo,
    /// toAmount / fromAmount on the human-readable amounts.
    pub exchange_rate: f64,
    /// Percent.
    pub price_impact: f64,
    /// Percent.
    pub slippage: f64,
    pub fees: FeeBreakdown,
    pub steps: Vec<RouteStep>,
    pub estimated_time_secs: u64,
    /// Unix seconds. A route must never be executed past this instant; the
    /// consumer re-quotes instead.
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawPayload>,
}

impl RouterRoute {
    /// Final output in smallest units, the comparison key for best-of
    /// selection.
    pub fn output_units(&self) -> U256 {
        self.to_token.amount_units
    }

    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.expires_at
    }
}

impl fmt::Display for RouterRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> {} {} via {} ({} steps)",
            self.from_token.amount,
            self.from_token.symbol,
            self.from_token.chain_id,
            self.to_token.amount,
            self.to_token.symbol,
            self.venue,
            self.steps.len()
        )
    }
}

//================================================================================================//
//                                  INTERNAL ROUTE RECORDS                                        //
//================================================================================================//

/// Verifier output. Constructed only through [`VerifiedRoute::new`], which
/// refuses zero output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedRoute {
    pub path: TokenPath,
    /// Expected amount at each path position; `amounts[0]` is the input and
    /// `amounts[last]` the final output.
    pub amounts: Vec<U256>,
    pub output_amount: U256,
    pub dex_id: String,
    pub chain_id: u64,
    pub valid: bool,
}

impl VerifiedRoute {
    /// Returns `None` for zero output or a malformed path, so a zero-output
    /// route is unrepresentable downstream.
    pub fn new(path: TokenPath, amounts: Vec<U256>, dex_id: String, chain_id: u64) -> Option<Self> {
        if path.len() < 2 || amounts.len() != path.len() || has_adjacent_duplicates(&path) {
            return None;
        }
        let output_amount = *amounts.last()?;
        if output_amount.is_zero() {
            return None;
        }
        Some(Self {
            path,
            amounts,
            output_amount,
            dex_id,
            chain_id,
            valid: true,
        })
    }
}

/// A verified single-chain route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SameChainRoute {
    /// `path[0]` is the input token, `path[last]` the delivered token.
    pub path: TokenPath,
    /// Expected amount at each path position.
    pub amounts: Vec<U256>,
    /// Smallest units of `path[last]`.
    pub output_amount: U256,
    pub dex_id: String,
    pub chain_id: u64,
    pub hops: u32,
    pub verified: bool,
    pub liquidity_usd: Option<f64>,
    /// Adjacent pairs traversed, in order.
    pub pairs: Vec<(Address, Address)>,
}

impl SameChainRoute {
    pub fn from_verified(v: VerifiedRoute) -> Self {
        let pairs = v.path.windows(2).map(|w| (w[0], w[1])).collect();
        let hops = v.path.len().saturating_sub(1) as u32;
        Self {
            path: v.path,
            amounts: v.amounts,
            output_amount: v.output_amount,
            dex_id: v.dex_id,
            chain_id: v.chain_id,
            hops,
            verified: true,
            liquidity_usd: None,
            pairs,
        }
    }

    /// Zero-hop leg used when an endpoint already is the requested token,
    /// e.g. bridging the token the caller holds. Output equals input.
    pub fn passthrough(token: Address, chain_id: u64, amount: U256) -> Self {
        Self {
            path: SmallVec::from_slice(&[token]),
            amounts: vec![amount],
            output_amount: amount,
            dex_id: "passthrough".into(),
            chain_id,
            hops: 0,
            verified: true,
            liquidity_usd: None,
            pairs: Vec::new(),
        }
    }

    pub fn input_token(&self) -> Address {
        self.path[0]
    }

    /// The token this leg actually delivers, which intermediary hops may
    /// have substituted for the nominally requested one.
    pub fn delivered_token(&self) -> Address {
        *self.path.last().unwrap_or(&self.path[0])
    }

    pub fn is_well_formed(&self) -> bool {
        !self.path.is_empty() && !has_adjacent_duplicates(&self.path)
    }
}

/// The bridge segment of a cross-chain route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeLeg {
    pub provider: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Address,
    /// The token the bridge actually delivers on the destination chain.
    pub to_token: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub estimated_time_secs: u64,
    /// Provider quote, kept opaque for the execution layer.
    pub quote: RawPayload,
}

/// Source leg + bridge + destination leg. `bridge.amount_in` always equals
/// `source_route.output_amount`; `dest_route` starts at the token the bridge
/// delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossChainRoute {
    pub source_route: SameChainRoute,
    pub bridge: BridgeLeg,
    pub dest_route: SameChainRoute,
    /// Smallest units of the final token on the destination chain.
    pub total_output: U256,
    /// Destination chain id.
    pub chain_id: u64,
}

impl CrossChainRoute {
    pub fn holds_invariants(&self) -> bool {
        self.bridge.amount_in == self.source_route.output_amount
            && self.total_output == self.dest_route.output_amount
            && self.dest_route.input_token() == self.bridge.to_token
    }
}

/// Multi-hop bundle: the individual legs plus the synthesized combined
/// route consumers actually execute against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiHopRoute {
    pub legs: Vec<RouterRoute>,
    pub combined: RouterRoute,
}

//================================================================================================//
//                                    CONSUMER BOUNDARY                                           //
//================================================================================================//

/// Canonical quote request accepted by the engine and the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Address,
    pub to_token: Address,
    /// Human-readable amount of `from_token`, e.g. "1.5".
    pub amount: String,
    #[serde(default)]
    pub slippage: Option<f64>,
    #[serde(default)]
    pub recipient: Option<Address>,
}

/// Discovery result: the best route plus any other normalized candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub route: RouterRoute,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub alternatives: Vec<RouterRoute>,
    /// Unix seconds at which discovery completed.
    pub timestamp: i64,
    /// Mirrors `route.expires_at`.
    pub expires_at: i64,
}
