//! # Pathfinding
//!
//! Same-chain route discovery and the multi-hop adapter fan-out. The
//! cross-chain composition lives in [`crate::cross`] and builds on the
//! same-chain finder here.

pub mod multihop;
pub mod samechain;

pub use multihop::MultiHopRouter;
pub use samechain::SameChainFinder;
