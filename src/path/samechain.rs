//! Three-tier same-chain route discovery: direct pair by venue priority,
//! then a prioritized-intermediary 2-hop scan against the top venue, then a
//! wrapped-native fallback. Direct pairs are cheapest to check, intermediary
//! pairs cover most real liquidity gaps, and the wrapped native is a
//! near-universal sink that should rarely but sometimes be the only option.

use std::sync::Arc;

use ethers::types::{Address, U256};
use smallvec::SmallVec;
use tracing::{debug, instrument, warn};

use crate::errors::{RouteError, VerifierError};
use crate::registry::{DexRegistry, TokenRegistry};
use crate::types::{format_path, SameChainRoute, TokenPath};
use crate::verifier::{QuoteVerifier, VerifyCandidate};

pub struct SameChainFinder {
    verifier: Arc<QuoteVerifier>,
    dexs: Arc<DexRegistry>,
    tokens: Arc<TokenRegistry>,
    /// Top-K intermediaries considered in the 2-hop scan.
    top_intermediaries: usize,
}

impl SameChainFinder {
    pub fn new(
        verifier: Arc<QuoteVerifier>,
        dexs: Arc<DexRegistry>,
        tokens: Arc<TokenRegistry>,
        top_intermediaries: usize,
    ) -> Self {
        Self {
            verifier,
            dexs,
            tokens,
            top_intermediaries,
        }
    }

    /// Finds a verified route, or `Ok(None)` once every strategy is
    /// exhausted. Per-venue failures never abort the remaining strategies.
    #[instrument(skip(self), fields(chain_id, from = %format!("{from_token:#x}"), to = %format!("{to_token:#x}"), amount_in = %amount_in))]
    pub async fn find(
        &self,
        from_token: Address,
        to_token: Address,
        chain_id: u64,
        amount_in: U256,
    ) -> Result<Option<SameChainRoute>, RouteError> {
        if from_token == to_token {
            return Err(RouteError::InvalidRequest(
                "from_token and to_token are identical".into(),
            ));
        }
        if amount_in.is_zero() {
            return Err(RouteError::InvalidRequest("amount_in is zero".into()));
        }

        if let Some(route) = self.find_direct(from_token, to_token, chain_id, amount_in).await? {
            return Ok(Some(route));
        }
        if let Some(route) = self
            .scan_intermediaries(from_token, to_token, chain_id, amount_in)
            .await?
        {
            return Ok(Some(route));
        }
        self.wrapped_native_fallback(from_token, to_token, chain_id, amount_in)
            .await
    }

    /// Strategy 1: direct pair against every venue in priority order, first
    /// verified route wins.
    async fn find_direct(
        &self,
        from_token: Address,
        to_token: Address,
        chain_id: u64,
        amount_in: U256,
    ) -> Result<Option<SameChainRoute>, RouteError> {
        let path: TokenPath = SmallVec::from_slice(&[from_token, to_token]);
        let venues: Vec<_> = self
            .dexs
            .venues(chain_id)
            .map_err(VerifierError::from)?
            .to_vec();
        for venue in venues {
            match self
                .verifier
                .verify(&path, chain_id, &venue.id, amount_in)
                .await
            {
                Ok(Some(verified)) => {
                    debug!(dex_id = %venue.id, out = %verified.output_amount, "Direct pair verified");
                    return Ok(Some(SameChainRoute::from_verified(verified)));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        chain_id,
                        dex_id = %venue.id,
                        error = %e,
                        "Direct verification failed on venue, trying next"
                    );
                }
            }
        }
        Ok(None)
    }

    /// Strategy 2: top-K configured intermediaries, one 2-hop candidate each
    /// plus the direct path, all verified against the chain's top venue; the
    /// best output wins.
    async fn scan_intermediaries(
        &self,
        from_token: Address,
        to_token: Address,
        chain_id: u64,
        amount_in: U256,
    ) -> Result<Option<SameChainRoute>, RouteError> {
        let top_venue = match self.dexs.top_venue(chain_id) {
            Ok(v) => v.id.clone(),
            Err(e) => {
                warn!(chain_id, error = %e, "No venue for intermediary scan");
                return Ok(None);
            }
        };
        let intermediaries: Vec<Address> = self
            .tokens
            .intermediaries(chain_id)
            .map_err(VerifierError::from)?
            .iter()
            .copied()
            .filter(|i| *i != from_token && *i != to_token)
            .take(self.top_intermediaries)
            .collect();
        if intermediaries.is_empty() {
            return Ok(None);
        }

        let mut candidates: Vec<VerifyCandidate> = Vec::with_capacity(intermediaries.len() + 1);
        candidates.push(VerifyCandidate {
            path: SmallVec::from_slice(&[from_token, to_token]),
            chain_id,
            dex_id: top_venue.clone(),
            amount_in,
        });
        for intermediary in intermediaries {
            candidates.push(VerifyCandidate {
                path: SmallVec::from_slice(&[from_token, intermediary, to_token]),
                chain_id,
                dex_id: top_venue.clone(),
                amount_in,
            });
        }

        let best = self.verifier.verify_many(&candidates).await?;
        Ok(best.map(|verified| {
            debug!(
                path = %format_path(&verified.path),
                out = %verified.output_amount,
                "Intermediary scan selected best candidate"
            );
            SameChainRoute::from_verified(verified)
        }))
    }

    /// Strategy 3: force the path through the wrapped native. Rejected
    /// outright when an endpoint already is the wrapped native, since that
    /// would duplicate a hop.
    async fn wrapped_native_fallback(
        &self,
        from_token: Address,
        to_token: Address,
        chain_id: u64,
        amount_in: U256,
    ) -> Result<Option<SameChainRoute>, RouteError> {
        let wrapped = self
            .tokens
            .wrapped_native(chain_id)
            .map_err(VerifierError::from)?;
        if from_token == wrapped || to_token == wrapped {
            debug!(chain_id, "Endpoint is the wrapped native, skipping fallback");
            return Ok(None);
        }

        let path: TokenPath = SmallVec::from_slice(&[from_token, wrapped, to_token]);
        let venues: Vec<_> = self
            .dexs
            .venues(chain_id)
            .map_err(VerifierError::from)?
            .to_vec();
        for venue in venues {
            match self
                .verifier
                .verify(&path, chain_id, &venue.id, amount_in)
                .await
            {
                Ok(Some(verified)) => {
                    debug!(dex_id = %venue.id, "Wrapped-native fallback verified");
                    return Ok(Some(SameChainRoute::from_verified(verified)));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        chain_id,
                        dex_id = %venue.id,
                        error = %e,
                        "Fallback verification failed on venue, trying next"
                    );
                }
            }
        }
        Ok(None)
    }
}
