//! # Probe-and-Scale
//!
//! The single implementation of the low-liquidity scaling heuristic used by
//! the quote verifier and the on-chain DEX adapter. When a full-amount
//! pricing call fails on liquidity, a descending ladder of smaller test
//! amounts is probed; the first success is linearly scaled back up and then
//! discounted, since an AMM's convex price-impact curve makes a naive linear
//! extrapolation overstate the real output.
//!
//! All intermediate products use `U512` so the scale-up can never silently
//! wrap.

use ethers::types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::errors::MathError;

/// Basis points denominator.
pub const BPS_DENOM: u32 = 10_000;

/// Descending test-amount ladder: fractions of the requested amount in
/// basis points, plus a fixed absolute floor probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeLadder {
    /// Strictly descending, e.g. `[5000, 1000, 100]` for 50%, 10%, 1%.
    pub fractions_bps: Vec<u32>,
    /// Smallest-unit floor probe tried after every fraction.
    pub floor: U256,
}

impl Default for ProbeLadder {
    fn default() -> Self {
        Self {
            fractions_bps: vec![5_000, 1_000, 100],
            floor: U256::exp10(15),
        }
    }
}

impl ProbeLadder {
    /// Test amounts in ladder order. Entries that collapse to zero, equal or
    /// exceed the full amount, or duplicate an earlier entry are dropped.
    pub fn test_amounts(&self, amount_in: U256) -> Vec<U256> {
        let mut out: Vec<U256> = Vec::with_capacity(self.fractions_bps.len() + 1);
        for bps in &self.fractions_bps {
            let scaled = (U512::from(amount_in) * U512::from(*bps)) / U512::from(BPS_DENOM);
            // A bps fraction of a U256 always fits back into a U256.
            let t = U256::try_from(scaled).unwrap_or(U256::zero());
            if !t.is_zero() && t < amount_in && !out.contains(&t) {
                out.push(t);
            }
        }
        if !self.floor.is_zero() && self.floor < amount_in && !out.contains(&self.floor) {
            out.push(self.floor);
        }
        out
    }

    pub fn is_descending(&self) -> bool {
        self.fractions_bps.windows(2).all(|w| w[0] > w[1])
    }
}

/// Discount applied to a linearly scaled probe result, in basis points.
/// Small extrapolations are taken at face value; past a 100x ratio the
/// estimate is haircut to 75%.
pub fn scale_factor_bps(ratio: U256) -> u32 {
    if ratio <= U256::from(10u64) {
        BPS_DENOM
    } else if ratio <= U256::from(100u64) {
        9_000
    } else {
        7_500
    }
}

/// Scales `observed_out` from a successful probe at `test_amount` back up to
/// the full `amount_in`: `observed * ratio * scale_factor`, where
/// `ratio = amount_in / test_amount` in integer math.
pub fn scale_probe_output(
    amount_in: U256,
    test_amount: U256,
    observed_out: U256,
) -> Result<U256, MathError> {
    if test_amount.is_zero() {
        return Err(MathError::DivisionByZero("scale_probe_output ratio"));
    }
    let mut ratio = amount_in / test_amount;
    if ratio.is_zero() {
        ratio = U256::one();
    }
    let bps = scale_factor_bps(ratio);
    let scaled = U512::from(observed_out)
        .checked_mul(U512::from(ratio))
        .and_then(|v| v.checked_mul(U512::from(bps)))
        .and_then(|v| v.checked_div(U512::from(BPS_DENOM)))
        .ok_or(MathError::Overflow("scale_probe_output"))?;
    U256::try_from(scaled).map_err(|_| MathError::Overflow("scale_probe_output narrow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_produces_descending_unique_amounts() {
        let ladder = ProbeLadder::default();
        let amount = U256::exp10(21);
        let probes = ladder.test_amounts(amount);
        assert_eq!(
            probes,
            vec![
                U256::exp10(21) / 2,
                U256::exp10(20),
                U256::exp10(19),
                U256::exp10(15),
            ]
        );
        assert!(probes.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn ladder_drops_degenerate_entries() {
        let ladder = ProbeLadder::default();
        // Floor above the request disappears; tiny fractions collapse to zero.
        let probes = ladder.test_amounts(U256::from(50u64));
        assert_eq!(probes, vec![U256::from(25u64), U256::from(5u64)]);
    }

    #[test]
    fn scale_factor_tiers() {
        assert_eq!(scale_factor_bps(U256::from(2u64)), 10_000);
        assert_eq!(scale_factor_bps(U256::from(10u64)), 10_000);
        assert_eq!(scale_factor_bps(U256::from(11u64)), 9_000);
        assert_eq!(scale_factor_bps(U256::from(100u64)), 9_000);
        assert_eq!(scale_factor_bps(U256::from(101u64)), 7_500);
        assert_eq!(scale_factor_bps(U256::exp10(6)), 7_500);
    }

    #[test]
    fn scales_one_percent_probe_with_discount() {
        // ratio 100 -> 90% discount tier: 5 * 100 * 0.9 = 450.
        let out = scale_probe_output(
            U256::from(1_000u64),
            U256::from(10u64),
            U256::from(5u64),
        )
        .unwrap();
        assert_eq!(out, U256::from(450u64));
    }

    #[test]
    fn small_ratio_is_undiscounted() {
        let out = scale_probe_output(
            U256::from(100u64),
            U256::from(50u64),
            U256::from(40u64),
        )
        .unwrap();
        assert_eq!(out, U256::from(80u64));
    }

    #[test]
    fn huge_ratio_takes_deep_discount() {
        // ratio 1000 -> 75%.
        let out = scale_probe_output(
            U256::from(1_000_000u64),
            U256::from(1_000u64),
            U256::from(8u64),
        )
        .unwrap();
        assert_eq!(out, U256::from(6_000u64));
    }

    #[test]
    fn zero_test_amount_is_rejected() {
        assert!(matches!(
            scale_probe_output(U256::one(), U256::zero(), U256::one()),
            Err(MathError::DivisionByZero(_))
        ));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let out = scale_probe_output(U256::MAX, U256::one(), U256::MAX);
        assert!(matches!(out, Err(MathError::Overflow(_))));
    }
}
