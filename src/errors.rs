//! # Centralized Error Handling
//!
//! Typed, hierarchical errors for the whole engine. Every domain owns one
//! enum; `From` bridges let lower layers flow upward without stringly-typed
//! context loss. "No route found" is deliberately NOT an error anywhere in
//! this crate: exhausted discovery returns `Ok(None)` and only genuine
//! infrastructure failures surface as `Err`.

use ethers::types::{Address, U256};
use thiserror::Error;

/// Top-level error returned by the route engine's public entry points.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Chain {0} is not configured")]
    UnsupportedChain(u64),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Discovery deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),
    #[error("Verifier error: {0}")]
    Verifier(#[from] VerifierError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Math error: {0}")]
    Math(#[from] MathError),
    #[error("Engine is shutting down")]
    Shutdown,
}

/// Failures inside the quote verifier. Insufficient liquidity never
/// appears here: it drives the probe ladder internally and ultimately
/// yields `Ok(None)`.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("Provider call failed on chain {chain_id}: {message}")]
    Provider { chain_id: u64, message: String },
    #[error("RPC call timed out after {0}ms")]
    Timeout(u64),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Unknown venue '{dex_id}' on chain {chain_id}")]
    UnknownVenue { chain_id: u64, dex_id: String },
    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Failures raised by venue adapters. `Unsupported*` variants are decided
/// before any network I/O.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Pair {from:?} -> {to:?} not supported by {venue}")]
    UnsupportedPair {
        venue: String,
        from: Address,
        to: Address,
    },
    #[error("Chain {chain_id} not supported by {venue}")]
    UnsupportedChain { venue: String, chain_id: u64 },
    #[error("HTTP error from {venue}: {message}")]
    Http { venue: String, message: String },
    #[error("Malformed response from {venue}: {message}")]
    InvalidResponse { venue: String, message: String },
    #[error("Circuit breaker open for {venue}, {remaining_secs}s of cooldown remaining")]
    CircuitOpen { venue: String, remaining_secs: u64 },
    #[error("Rate limited by {venue}")]
    RateLimited { venue: String },
    #[error("Verifier error: {0}")]
    Verifier(#[from] VerifierError),
    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Failures from bridge quote providers.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge {provider} does not serve {from_chain} -> {to_chain}")]
    UnsupportedRoute {
        provider: String,
        from_chain: u64,
        to_chain: u64,
    },
    #[error("HTTP error from bridge {provider}: {message}")]
    Http { provider: String, message: String },
    #[error("Malformed quote from bridge {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
    #[error("Bridge quote timed out after {0}ms")]
    Timeout(u64),
    #[error("No bridge provider configured for {from_chain} -> {to_chain}")]
    NoProvider { from_chain: u64, to_chain: u64 },
}

/// Failures resolving injected registry data.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Chain {0} is not configured")]
    UnknownChain(u64),
    #[error("No venues configured for chain {0}")]
    NoVenues(u64),
    #[error("Unknown venue '{dex_id}' on chain {chain_id}")]
    UnknownVenue { chain_id: u64, dex_id: String },
    #[error("Decimals unavailable for token {token:?} on chain {chain_id}: {message}")]
    DecimalsUnavailable {
        chain_id: u64,
        token: Address,
        message: String,
    },
    #[error("Route assembly requires at least one leg")]
    EmptyRoute,
}

/// Configuration loading/validation failures. Raised only at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Low-level RPC transport failures, shared by everything that runs through
/// a chain's rate limiter.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("RPC call timed out after {0}ms")]
    Timeout(u64),
}

/// Checked-arithmetic failures on raw token amounts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),
    #[error("Amount {amount} does not fit in {decimals} decimals: {message}")]
    AmountParse {
        amount: String,
        decimals: u8,
        message: String,
    },
    #[error("Value {0} exceeds the representable range")]
    OutOfRange(U256),
}

impl From<AdapterError> for RouteError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::UnsupportedChain { chain_id, .. } => RouteError::UnsupportedChain(chain_id),
            other => RouteError::Provider(other.to_string()),
        }
    }
}

impl From<BridgeError> for RouteError {
    fn from(e: BridgeError) -> Self {
        RouteError::Provider(e.to_string())
    }
}

impl From<RegistryError> for VerifierError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownVenue { chain_id, dex_id } => {
                VerifierError::UnknownVenue { chain_id, dex_id }
            }
            other => VerifierError::InvalidPath(other.to_string()),
        }
    }
}
