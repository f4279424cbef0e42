//! Route discovery and verification engine for cross-venue token swaps.
//!
//! The crate is organized around one pipeline: canonical requests enter the
//! [`engine::RouteEngine`], same-chain candidates come from the tiered
//! [`path::SameChainFinder`] and the adapter fan-out in
//! [`path::MultiHopRouter`], cross-chain routes are composed by
//! [`cross::CrossChainFinder`], every on-chain candidate is confirmed by the
//! [`verifier::QuoteVerifier`], and the [`normalizer::RouteNormalizer`] turns
//! winners into the consumer-facing [`types::RouterRoute`] shape.

pub mod adapters;
pub mod amounts;
pub mod bridges;
pub mod config;
pub mod cross;
pub mod decimals;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod normalizer;
pub mod path;
pub mod providers;
pub mod rate_limiter;
pub mod registry;
pub mod scaling;
pub mod server;
pub mod types;
pub mod verifier;

pub use config::Config;
pub use engine::RouteEngine;
pub use errors::RouteError;
pub use types::{RouteRequest, RouteResponse, RouterRoute};
