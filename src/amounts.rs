//! # Amount Conversion
//!
//! Smallest-unit to human-readable conversions and back. All conversions on
//! raw amounts are pure integer math: quotient plus remainder-derived
//! fraction, with trailing zeros trimmed. Floating point only ever touches
//! the already-formatted decimal strings (exchange rates, fee display).

use ethers::types::U256;

use crate::errors::MathError;

/// Largest decimals value for which `10^decimals` fits in a U256.
const MAX_DECIMALS: u8 = 77;

/// Formats a smallest-unit amount as a decimal string using integer
/// division. `1234500000000000000` with 18 decimals renders as `"1.2345"`.
pub fn to_human(amount: U256, decimals: u8) -> String {
    if decimals == 0 || decimals > MAX_DECIMALS {
        return amount.to_string();
    }
    let divisor = U256::exp10(decimals as usize);
    let whole = amount / divisor;
    let rem = amount % divisor;
    if rem.is_zero() {
        return whole.to_string();
    }
    let mut frac = rem.to_string();
    while frac.len() < decimals as usize {
        frac.insert(0, '0');
    }
    let frac = frac.trim_end_matches('0');
    format!("{whole}.{frac}")
}

/// Parses a human-readable decimal string into smallest units. Rejects more
/// fractional digits than the token carries rather than silently rounding.
pub fn from_human(human: &str, decimals: u8) -> Result<U256, MathError> {
    let s = human.trim();
    let parse_err = |message: &str| MathError::AmountParse {
        amount: human.to_string(),
        decimals,
        message: message.to_string(),
    };

    if s.is_empty() || s == "." {
        return Err(parse_err("empty amount"));
    }
    if s.starts_with('-') {
        return Err(parse_err("negative amount"));
    }
    if decimals > MAX_DECIMALS {
        return Err(parse_err("decimals out of range"));
    }

    let mut parts = s.splitn(2, '.');
    let whole_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if frac_part.contains('.') {
        return Err(parse_err("multiple decimal points"));
    }
    if !whole_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(parse_err("non-numeric characters"));
    }
    if frac_part.len() > decimals as usize {
        return Err(parse_err("more fractional digits than token decimals"));
    }

    let whole = if whole_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole_part).map_err(|_| parse_err("whole part out of range"))?
    };

    let scale = U256::exp10(decimals as usize);
    let scaled_whole = whole
        .checked_mul(scale)
        .ok_or(MathError::Overflow("from_human whole"))?;

    if frac_part.is_empty() {
        return Ok(scaled_whole);
    }
    let mut frac = frac_part.to_string();
    while frac.len() < decimals as usize {
        frac.push('0');
    }
    let frac_units =
        U256::from_dec_str(&frac).map_err(|_| parse_err("fractional part out of range"))?;
    scaled_whole
        .checked_add(frac_units)
        .ok_or(MathError::Overflow("from_human fraction"))
}

/// Exchange rate between two already-formatted human amounts. Zero input
/// yields a zero rate rather than infinity.
pub fn exchange_rate(from_human: &str, to_human: &str) -> f64 {
    let from = from_human.parse::<f64>().unwrap_or(0.0);
    let to = to_human.parse::<f64>().unwrap_or(0.0);
    if from == 0.0 {
        0.0
    } else {
        to / from
    }
}
