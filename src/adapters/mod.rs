//! # Venue Adapter Boundary
//!
//! One trait every venue plugin implements, and the registry the finders
//! select adapters from at runtime. The core only ever consumes this
//! contract; how an adapter reaches its venue (an `eth_call` to a DEX router
//! or an HTTP quote endpoint) is its own business.

pub mod aggregator;
pub mod dex;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::AdapterError;
use crate::types::{RouterParams, RouterRoute};

pub use aggregator::AggregatorVenueAdapter;
pub use dex::DexRouterAdapter;

/// Capability contract for a venue. `get_route` returns `Ok(None)` for "no
/// liquidity" and errors only for transport or validation trouble; the
/// `Unsupported*` variants are decided before any network I/O.
#[async_trait]
pub trait VenueAdapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Lower values are tried first.
    fn priority(&self) -> u32;

    fn supports_chain(&self, chain_id: u64) -> bool;

    fn supports_cross_chain(&self) -> bool;

    async fn get_route(&self, params: &RouterParams) -> Result<Option<RouterRoute>, AdapterError>;
}

/// Runtime venue table, priority-sorted at construction.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn VenueAdapter>>,
}

impl AdapterRegistry {
    pub fn new(mut adapters: Vec<Arc<dyn VenueAdapter>>) -> Self {
        adapters.sort_by_key(|a| a.priority());
        Self { adapters }
    }

    pub fn all(&self) -> &[Arc<dyn VenueAdapter>] {
        &self.adapters
    }

    /// Adapters serving `chain_id`, priority order.
    pub fn for_chain(&self, chain_id: u64) -> Vec<Arc<dyn VenueAdapter>> {
        self.adapters
            .iter()
            .filter(|a| a.supports_chain(chain_id))
            .cloned()
            .collect()
    }

    /// Adapters able to quote a cross-chain pair end to end.
    pub fn cross_chain(&self, from_chain_id: u64, to_chain_id: u64) -> Vec<Arc<dyn VenueAdapter>> {
        self.adapters
            .iter()
            .filter(|a| {
                a.supports_cross_chain()
                    && a.supports_chain(from_chain_id)
                    && a.supports_chain(to_chain_id)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
